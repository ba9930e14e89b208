mod activation_test;
mod engine_test;
mod failure_test;
mod schema_evolution_test;
mod state_test;
