use std::sync::Arc;

use tracing::{debug, instrument};

use alpha_core::{ContextRecord, InstallationId};

use crate::backend::ContextBackend;
use crate::cache::LocalCache;
use crate::fallback::{attempt, cached, Origin};

/// The installation's context record, remote first with the local cache as
/// fallback. Neither operation fails from the caller's point of view.
#[derive(Clone)]
pub struct ContextStore {
    owner: InstallationId,
    remote: Arc<dyn ContextBackend>,
    cache: Arc<LocalCache>,
}

impl ContextStore {
    pub fn new(
        owner: InstallationId,
        remote: Arc<dyn ContextBackend>,
        cache: Arc<LocalCache>,
    ) -> Self {
        Self {
            owner,
            remote,
            cache,
        }
    }

    pub fn owner(&self) -> &InstallationId {
        &self.owner
    }

    /// Remote record (mirrored into the cache), else the cached record, else
    /// an empty one.
    #[instrument(skip(self), fields(owner = %self.owner))]
    pub async fn load(&self) -> ContextRecord {
        match attempt("context.load", self.remote.load_context(&self.owner)).await {
            Ok(Some(record)) => {
                let _ = cached("context.mirror", self.cache.mirror_context(&self.owner, &record));
                return record;
            }
            Ok(None) => debug!("no remote context yet"),
            Err(_) => {}
        }

        match cached("context.load", self.cache.load_context(&self.owner).await).flatten() {
            Some(record) => {
                debug!("serving cached context");
                record
            }
            None => ContextRecord::default(),
        }
    }

    /// Write the cache, then the remote. The cache always reflects the most
    /// recently issued save; a remote failure is logged and reported as
    /// [`Origin::Local`].
    #[instrument(skip(self, record), fields(owner = %self.owner))]
    pub async fn save(&self, record: &ContextRecord) -> Origin {
        let _ = cached("context.save", self.cache.put_context(&self.owner, record));

        match attempt("context.save", self.remote.save_context(&self.owner, record)).await {
            Ok(_) => Origin::Remote,
            Err(_) => Origin::Local,
        }
    }
}
