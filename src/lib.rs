//! TIE feedback core: evaluates learner code against question tasks and
//! turns the results into graded, escalating feedback.

pub mod buggy;
pub mod config;
pub mod domain;
pub mod error;
pub mod eval_result;
pub mod evaluator;
pub mod feedback;
pub mod learner;
pub mod logic;
pub mod preprocess;
pub mod protocol;
pub mod routes;
pub mod runner;
pub mod seeds;
pub mod state;
pub mod storage;
pub mod telemetry;
pub mod tips;
pub mod traceback;
pub mod util;
