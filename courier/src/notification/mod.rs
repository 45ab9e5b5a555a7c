//! Notification pipeline.
//!
//! An event is matched against routing rules ([`router`]), expanded into one
//! queue item per recipient ([`queue`], [`dispatch`]) and delivered later by
//! the [`processor`], which resolves a sender ([`sender`]), renders the
//! template ([`template`]), rewrites CTA links for click tracking
//! ([`tracking`]) and sends through a channel transport ([`channels`]).

pub mod channels;
pub mod clock;
pub mod dispatch;
pub mod processor;
pub mod queue;
pub mod router;
pub mod sender;
pub mod template;
pub mod tracking;

pub use channels::{ChannelTransport, Delivery, TransportConfig, Transports};
pub use clock::{Clock, ManualClock, SystemClock};
pub use dispatch::{TriggerOutcome, TriggerService};
pub use processor::{BatchReport, ItemOutcome, ItemReport, Processor, ProcessorConfig};
pub use router::{EventRouter, Route, RouteSet};
