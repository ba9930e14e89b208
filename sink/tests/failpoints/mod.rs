mod flush_test;
