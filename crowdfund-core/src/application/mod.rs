//! Application layer: the protocols a party runs, composed from domain rules and infrastructure.

pub mod broadcast;
pub mod cash;
pub mod lifecycle;
pub mod node;
pub mod observer;
pub mod provenance;
pub mod scheduler;
pub mod service;
pub mod settlement;

pub use lifecycle::{EndResult, EndTrigger, SkipReason, StartedCampaign};
pub use node::{NodeServices, PartyNode};
pub use observer::{AuditEvent, AuditObserver, CampaignObserver, CompositeObserver, NoopObserver};
pub use provenance::collect_dependencies;
pub use scheduler::{run_scheduled_end, schedule_campaign_end};
pub use service::{run_responder_loop, spawn_responder_loop};
