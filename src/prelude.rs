//! Everything needed to build and consume streams.

pub use crate::config::{RxConfig, SchedulerConfig};
pub use crate::disposable::Disposable;
pub use crate::error::{ErrorKind, RxError, RxResult};
pub use crate::flowable::{
    BackpressureStrategy, Flowable, FlowableEmitter, Subscriber, Subscription, TestSubscriber,
};
pub use crate::observable::{
    ConnectableObservable, Emitter, GroupedObservable, Observable, combine_latest, concat, merge,
    try_zip, zip,
};
pub use crate::observer::{LambdaObserver, Observer, TestObserver};
pub use crate::scheduler::{Scheduler, SchedulerKind, SchedulerRef, Schedulers, TestScheduler};
pub use crate::signal::Signal;
pub use crate::subject::PublishSubject;
