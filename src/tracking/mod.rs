// src/tracking/mod.rs - Work-session tracking engine

pub mod accrual;
pub mod bus;
pub mod capture_loop;
pub mod clock;
pub mod engine;
pub mod schedule;
pub mod state;
pub mod status_file;

pub use bus::{EventBus, SnapshotHandler, Subscription};
pub use clock::{Clock, SystemClock, Ticker};
pub use engine::SessionEngine;
pub use schedule::CaptureWindow;
pub use state::{SessionSnapshot, SessionStatus};
pub use status_file::{SessionRecord, StatusFile};
