//! Locker command dispatch
//!
//! A kiosk asks for a short-lived scan session bound to one locker and shows
//! the returned code as a QR image. Scanning the code exchanges it, exactly
//! once, for an `OPEN` command on that locker's queue. Lockers poll their
//! queue and acknowledge each command after carrying it out.
//!
//! The HTTP surface lives in [`routes`]; the operations themselves are on
//! [`service::DispatchService`] and run against any [`store::DispatchStore`].

pub mod clock;
pub mod config;
pub mod device;
pub mod error;
pub mod middleware;
pub mod models;
pub mod retention;
pub mod routes;
pub mod service;
pub mod state;
pub mod store;
pub mod throttle;
