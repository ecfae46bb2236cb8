//! User classloader abstraction ("a user classloader for
//! deserializing operator code"). Operator factories travel through the
//! system as opaque bytes (`StreamNode::operator_factory`); this trait is
//! the single point where those bytes become a constructible operator,
//! kept separate so the RPC/graph layers never depend on the concrete
//! operator trait object.

use crate::error::Result;
use crate::ids::OperatorId;
use std::sync::Arc;

/// Resolves an operator factory's serialized bytes into a constructible
/// handle. Implementations typically wrap a plugin/dylib loader or an
/// in-process registry; `conduit-core` only describes the seam.
pub trait ClassLoader: Send + Sync {
    fn resolve(&self, operator_id: &OperatorId, factory_bytes: &[u8]) -> Result<Arc<dyn OperatorFactory>>;
}

/// Constructs operator instances at task deployment time. The produced
/// operator itself is generic over the runtime's record type, which lives
/// in `conduit-executor` — this trait only needs to prove the bytes
/// resolved to *something* loadable.
pub trait OperatorFactory: Send + Sync {
    fn operator_id(&self) -> &OperatorId;
}

/// Classloader used in tests and single-binary deployments where operator
/// code is compiled directly into the executor rather than shipped as a
/// separate artifact; `resolve` always errors since no bytes are
/// meaningful without a real loader behind them.
pub struct NoopClassLoader;

impl ClassLoader for NoopClassLoader {
    fn resolve(&self, operator_id: &OperatorId, _factory_bytes: &[u8]) -> Result<Arc<dyn OperatorFactory>> {
        Err(crate::error::ConduitError::internal(format!(
            "NoopClassLoader cannot resolve operator {operator_id}"
        )))
    }
}
