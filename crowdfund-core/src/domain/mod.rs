//! Domain layer: records, transactions and the rules that judge them. No I/O.

pub mod cash_selection;
pub mod command;
pub mod identity;
pub mod lifecycle;
pub mod model;
pub mod settlement;
pub mod transaction;
pub mod verification;

pub use cash_selection::{generate_spend, SpendPlan};
pub use command::{CampaignCommand, CashCommand, Command, CommandWithSigners, PledgeCommand};
pub use identity::IdentityDisclosure;
pub use lifecycle::{CampaignStatus, EndOutcome};
pub use model::{Campaign, Cash, Pledge, Record, RecordKind, RecordRef, ResolvedRecord};
pub use settlement::{build_end_transaction, merge_payloads, MergedSettlement, Outcome, SettlementPayload};
pub use transaction::{LedgerTransaction, ResolvedTransaction, SignedTransaction, TransactionBuilder, TransactionSignature, WireTransaction};
pub use verification::verify;
