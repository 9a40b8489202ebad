// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Thin façade over the camera supervisors: enumerate, add, update, remove,
//! and persist, plus boot-time autostart (§4.9). Everything that isn't
//! bookkeeping across cameras belongs in `supervisor`, not here.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use crate::config::model::CameraSpec;
use crate::config::store::ConfigStore;
use crate::error::{NvrError, Result};
use crate::media::adapter::MediaAdapter;
use crate::storage_watcher::StorageWatcher;
use crate::subscription::SubscriptionRegistry;
use crate::supervisor::CameraStreamSupervisor;

const STORAGE_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Owns every configured camera's supervisor, the shared subscription
/// registry, and the shared storage watcher. One instance per process.
pub struct Engine {
    store: Arc<ConfigStore>,
    adapter: Arc<dyn MediaAdapter>,
    registry: Arc<SubscriptionRegistry>,
    storage_watcher: Arc<StorageWatcher>,
    supervisors: RwLock<HashMap<String, Arc<CameraStreamSupervisor>>>,
}

impl Engine {
    pub fn new(store: Arc<ConfigStore>, adapter: Arc<dyn MediaAdapter>) -> Result<Arc<Self>> {
        let storage_settings = store.load_storage_settings()?;
        let recording_root = PathBuf::from(&storage_settings.recording_path);
        let storage_watcher = Arc::new(StorageWatcher::new(
            &recording_root,
            storage_settings.min_free_space_gb,
            storage_settings.min_free_space_pct,
            storage_settings.retention_days,
            storage_settings.delete_batch_size,
            storage_settings.delete_batch_delay_s,
        ));
        storage_watcher.clone().spawn(STORAGE_POLL_INTERVAL);

        Ok(Arc::new(Self {
            store,
            adapter,
            registry: Arc::new(SubscriptionRegistry::new()),
            storage_watcher,
            supervisors: RwLock::new(HashMap::new()),
        }))
    }

    pub fn registry(&self) -> Arc<SubscriptionRegistry> {
        self.registry.clone()
    }

    /// Builds a supervisor for every persisted camera and, per camera,
    /// starts streaming/recording if its `*_on_start` flags say so.
    /// Subscribers must register before calling this (O1).
    pub fn start_enabled_on_boot(self: &Arc<Self>) -> Result<()> {
        let cameras = self.store.load_cameras()?;
        for camera in cameras {
            if !camera.enabled {
                continue;
            }
            let supervisor = self.build_supervisor(camera.clone())?;
            self.supervisors.write().insert(camera.camera_id.clone(), supervisor.clone());
            if camera.streaming_on_start || camera.recording_on_start {
                supervisor.start_streaming();
            }
        }
        Ok(())
    }

    fn build_supervisor(&self, camera: CameraSpec) -> Result<Arc<CameraStreamSupervisor>> {
        let streaming_settings = self.store.load_streaming_settings()?;
        let recording_settings = self.store.load_recording_settings()?;
        let storage_settings = self.store.load_storage_settings()?;
        Ok(CameraStreamSupervisor::new(
            self.adapter.clone(),
            camera,
            streaming_settings,
            recording_settings,
            PathBuf::from(storage_settings.recording_path),
            self.registry.clone(),
            self.storage_watcher.clone(),
        ))
    }

    pub fn list_cameras(&self) -> Result<Vec<CameraSpec>> {
        self.store.load_cameras()
    }

    pub fn add_camera(self: &Arc<Self>, camera: CameraSpec) -> Result<()> {
        let mut cameras = self.store.load_cameras()?;
        if cameras.iter().any(|c| c.camera_id == camera.camera_id) {
            return Err(NvrError::CameraDuplicate { id: camera.camera_id });
        }
        cameras.push(camera.clone());
        self.store.save_cameras(&cameras)?;

        let supervisor = self.build_supervisor(camera.clone())?;
        self.supervisors.write().insert(camera.camera_id.clone(), supervisor.clone());
        if camera.streaming_on_start || camera.recording_on_start {
            supervisor.start_streaming();
        }
        Ok(())
    }

    pub fn update_camera(&self, camera: CameraSpec) -> Result<()> {
        let mut cameras = self.store.load_cameras()?;
        let Some(slot) = cameras.iter_mut().find(|c| c.camera_id == camera.camera_id) else {
            return Err(NvrError::CameraNotFound { id: camera.camera_id });
        };
        *slot = camera.clone();
        self.store.save_cameras(&cameras)?;

        if let Some(supervisor) = self.supervisors.read().get(&camera.camera_id) {
            supervisor.update_camera(camera);
        }
        Ok(())
    }

    pub fn remove_camera(&self, camera_id: &str) -> Result<()> {
        let mut cameras = self.store.load_cameras()?;
        let before = cameras.len();
        cameras.retain(|c| c.camera_id != camera_id);
        if cameras.len() == before {
            return Err(NvrError::CameraNotFound { id: camera_id.to_string() });
        }
        self.store.save_cameras(&cameras)?;

        if let Some(supervisor) = self.supervisors.write().remove(camera_id) {
            supervisor.stop_streaming();
        }
        Ok(())
    }

    pub fn supervisor(&self, camera_id: &str) -> Option<Arc<CameraStreamSupervisor>> {
        self.supervisors.read().get(camera_id).cloned()
    }

    /// Tears every camera down. Called once, from the Ctrl+C handler.
    pub fn shutdown(&self) {
        for supervisor in self.supervisors.read().values() {
            supervisor.stop_streaming();
        }
    }
}
