pub mod chain;
pub mod file;
pub mod memory;
pub mod record;
pub mod sink;

pub use chain::{
    verify_records, AuditChain, AuditError, AuditFault, IntegrityFailure, IntegrityKind,
};
pub use file::{FileSink, FileSinkError};
pub use memory::MemorySink;
pub use record::{AuditRecord, DecisionRecord};
pub use sink::AuditSink;
