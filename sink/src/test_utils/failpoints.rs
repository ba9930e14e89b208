use fail::FailScenario;

/// Failpoints configured for the lifetime of the value.
///
/// Every configured failpoint is switched off again on drop, so a failing test does not leak
/// its failpoints into the next one.
pub struct ConfiguredFailpoints<'a> {
    _scenario: FailScenario<'a>,
    failpoints: Vec<String>,
}

impl<'a> ConfiguredFailpoints<'a> {
    /// Configures each `(failpoint, action)` pair, for example
    /// `("writer.before_write", "2*return(timed_retry)")`.
    pub fn setup(failpoints: &[(&str, &str)]) -> ConfiguredFailpoints<'a> {
        let scenario = FailScenario::setup();

        for (failpoint, action) in failpoints {
            fail::cfg(*failpoint, action).unwrap();
        }

        Self {
            _scenario: scenario,
            failpoints: failpoints
                .iter()
                .map(|(failpoint, _)| failpoint.to_string())
                .collect(),
        }
    }

    pub fn teardown(self) {
        drop(self);
    }
}

impl Drop for ConfiguredFailpoints<'_> {
    fn drop(&mut self) {
        for failpoint in &self.failpoints {
            fail::remove(failpoint);
        }
    }
}
