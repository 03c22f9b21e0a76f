use std::sync::Arc;

use uuid::Uuid;

use super::registry::ObserverList;
use super::target::ModuleHandle;
use crate::models::error::HookError;

/// Notified after the host loads a module.
pub trait ModuleLoadHandler: Send + Sync {
    fn after_module_load(&self, module: ModuleHandle, name: &str) -> Result<(), HookError>;
}

/// Notified after the host instantiates an object through the generic
/// object-creation entry point.
pub trait InstanceCreationHandler: Send + Sync {
    fn after_instance_created(&self, type_id: &Uuid, object: usize) -> Result<(), HookError>;
}

#[derive(Clone)]
pub enum LifecycleHandler {
    ModuleLoad(Arc<dyn ModuleLoadHandler>),
    InstanceCreation(Arc<dyn InstanceCreationHandler>),
}

/// Embedder handlers for the two standing watchers.
#[derive(Default)]
pub struct LifecycleWatchers {
    module_load: ObserverList<dyn ModuleLoadHandler>,
    instance_creation: ObserverList<dyn InstanceCreationHandler>,
}

impl LifecycleWatchers {
    pub fn add(&self, handler: LifecycleHandler) {
        match handler {
            LifecycleHandler::ModuleLoad(h) => self.module_load.add(h),
            LifecycleHandler::InstanceCreation(h) => self.instance_creation.add(h),
        }
    }

    pub fn module_loaded(&self, module: ModuleHandle, name: &str) {
        self.module_load
            .notify("after_module_load", |h| h.after_module_load(module, name));
    }

    pub fn instance_created(&self, type_id: &Uuid, object: usize) {
        self.instance_creation
            .notify("after_instance_created", |h| h.after_instance_created(type_id, object));
    }
}
