use thiserror::Error;

use crate::gate::GateError;
use crate::ledger::LedgerError;
use crate::model::ContentError;
use crate::routing::RoutingError;
use crate::snapshot::SnapshotError;

/// Any domain failure raised by this crate.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Content(#[from] ContentError),
    #[error(transparent)]
    Gate(#[from] GateError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Routing(#[from] RoutingError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}
