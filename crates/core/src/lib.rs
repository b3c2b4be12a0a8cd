pub mod audit;
pub mod clock;
pub mod compose;
pub mod config;
pub mod contract;
pub mod domain;
pub mod errors;
pub mod memory;
pub mod orchestrator;
pub mod parser;
pub mod ports;
pub mod rates;
pub mod reconcile;

pub use audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink, TracingAuditSink};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions};
pub use contract::{ContractArtifact, ContractError, ContractMaterializer};
pub use domain::bid::{Bid, BidDetails, BidId, BidStatus};
pub use domain::carrier::{Carrier, CarrierDirectory, CarrierProfile};
pub use domain::catalog::{CostItem, CostLine};
pub use domain::contract::ContractRecord;
pub use domain::offer::{Offer, OfferKey, OfferStatus};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use orchestrator::{
    AttachmentCandidate, BidDraft, Collaborators, ContractDispatch, DeskSettings, FreightDesk,
    IngestReport, SubmissionReport,
};
pub use parser::{OfferParser, ParseOutcome};
pub use ports::{
    ArtifactStore, Collection, InboundMessage, MailTransport, OutboundMail, RecordStore,
    TemplateRenderer,
};
pub use rates::{RateSource, RateTable};
pub use reconcile::{Comparison, ComparisonFilter, StatusEdit, StatusPassReport};
