// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

//! Process-wide single-instance provisioning.
//!
//! The registry maps a `TypeId` to the one live instance of that type. Reads go
//! through a lock-free snapshot; only the first request for a type takes the
//! creation mutex, re-checks the snapshot and runs the factory (double-checked
//! locking). A failing factory leaves the registry untouched so a later call
//! can retry.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use arc_swap::ArcSwap;
use log::debug;

type Instances = HashMap<TypeId, Arc<dyn Any + Send + Sync>>;

pub struct SingletonProvider {
    instances: ArcSwap<Instances>,
    // held only for check-create-publish
    create_lock: Mutex<()>,
}

static GLOBAL_PROVIDER: OnceLock<SingletonProvider> = OnceLock::new();

impl SingletonProvider {
    pub fn new() -> Self {
        Self {
            instances: ArcSwap::from_pointee(HashMap::new()),
            create_lock: Mutex::new(()),
        }
    }

    /// The provider shared by the whole process. Its entries live until exit.
    pub fn global() -> &'static SingletonProvider {
        GLOBAL_PROVIDER.get_or_init(SingletonProvider::new)
    }

    /// Returns the instance of `T`, creating it with `factory` on first use.
    ///
    /// `factory` runs at most once successfully per provider, no matter how
    /// many threads race on the first request. It must not ask the same
    /// provider for another singleton: the creation mutex is not re-entrant.
    pub fn get_or_create<T, E, F>(&self, factory: F) -> Result<Arc<T>, E>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> Result<T, E>,
    {
        if let Some(instance) = self.get::<T>() {
            return Ok(instance);
        }

        let _guard = self
            .create_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        // another thread may have won while we were waiting for the lock
        if let Some(instance) = self.get::<T>() {
            return Ok(instance);
        }

        let instance = Arc::new(factory()?);
        let erased: Arc<dyn Any + Send + Sync> = instance.clone();

        let mut next: Instances = (**self.instances.load()).clone();
        next.insert(TypeId::of::<T>(), erased);
        self.instances.store(Arc::new(next));
        debug!("Created singleton {}", std::any::type_name::<T>());

        Ok(instance)
    }

    /// Looks up an already created instance without creating one.
    pub fn get<T>(&self) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        let snapshot = self.instances.load();
        let erased = snapshot.get(&TypeId::of::<T>())?.clone();
        erased.downcast::<T>().ok()
    }

    pub fn contains<T>(&self) -> bool
    where
        T: Any + Send + Sync,
    {
        self.instances.load().contains_key(&TypeId::of::<T>())
    }

    pub(crate) fn len(&self) -> usize {
        self.instances.load().len()
    }
}

impl Default for SingletonProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SingletonProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingletonProvider")
            .field("instances", &self.len())
            .finish()
    }
}
