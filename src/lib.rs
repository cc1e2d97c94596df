pub mod config;
pub mod disposable;
pub mod error;
pub mod flowable;
pub mod hooks;
pub mod observable;
pub mod observer;
pub mod scheduler;
pub mod signal;
pub mod subject;
pub mod utils;

pub mod prelude;
