#![allow(dead_code)]

pub use lifecycle_test_utils::builders;
pub use lifecycle_test_utils::fakes;
pub use lifecycle_test_utils::{Harness, init_tracing, with_timeout};

pub type TestResult = Result<(), Box<dyn std::error::Error>>;
