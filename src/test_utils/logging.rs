use std::time::Instant;

/// Banner-style logger for verbose tests.
pub struct TestLogger {
    test_name: String,
    start_time: Instant,
}

impl TestLogger {
    pub fn new(test_name: &str) -> Self {
        let separator = "=".repeat(60);
        println!("\n{separator}");
        println!("[TEST START] {test_name}");
        println!("{separator}");
        Self {
            test_name: test_name.to_string(),
            start_time: Instant::now(),
        }
    }

    pub fn log_input<T: std::fmt::Debug>(&self, name: &str, value: &T) {
        println!("[INPUT] {name}: {value:?}");
    }

    pub fn log_expected<T: std::fmt::Debug>(&self, value: &T) {
        println!("[EXPECTED] {value:?}");
    }

    pub fn log_actual<T: std::fmt::Debug>(&self, value: &T) {
        println!("[ACTUAL] {value:?}");
    }

    /// Log one pipeline stage with its timing.
    pub fn log_stage(&self, stage: &str, detail: &str) {
        println!(
            "[STAGE] {stage} +{:?}: {detail}",
            self.start_time.elapsed()
        );
    }

    pub fn pass(&self) {
        let elapsed = self.start_time.elapsed();
        println!("[RESULT] PASSED {} in {elapsed:?}", self.test_name);
        println!("{}\n", "=".repeat(60));
    }

    pub fn fail(&self, reason: &str) {
        let elapsed = self.start_time.elapsed();
        println!("[RESULT] FAILED {} in {elapsed:?}", self.test_name);
        println!("[REASON] {reason}");
        println!("{}\n", "=".repeat(60));
    }

    pub fn test_name(&self) -> &str {
        &self.test_name
    }
}
