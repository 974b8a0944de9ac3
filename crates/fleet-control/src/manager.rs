//! Fleet manager: the single writer for proxy configuration.
//!
//! Every registration operation runs under one lock: change the fragment
//! set, regenerate, and only then commit the in-memory and autoscaler
//! state. If the proxy rejects the result, the fragment set is put back the
//! way it was and the effective file is rewritten from it, so the files on
//! disk always describe the last configuration the proxy accepted.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{error, info, warn};

use fleet_autoscale::AutoScaleController;
use fleet_core::{Application, Endpoint, FleetConfig, FleetError, FleetResult, ThresholdConfig};
use fleet_proxy::{ConfigFragment, ListenBlock, ProxyControl, ReloadCoordinator, ServerOptions};

/// Values shared by every listener the manager generates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerSettings {
    pub listen_address: String,
    /// Application `n` listens on `start_port + n`.
    pub start_port: u16,
    /// Prepended to application names to form their fragment owner.
    pub app_prefix: String,
    pub server_options: ServerOptions,
    /// Used when a registration supplies no thresholds.
    pub default_thresholds: ThresholdConfig,
}

impl ManagerSettings {
    pub fn from_config(config: &FleetConfig) -> Self {
        Self {
            listen_address: config.proxy.listen_address.clone(),
            start_port: config.proxy.start_port,
            app_prefix: config.proxy.app_prefix.clone(),
            server_options: config.health_check.into(),
            default_thresholds: config.autoscale.default_thresholds,
        }
    }
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self::from_config(&FleetConfig::default())
    }
}

/// A non-application listener, e.g. the platform's own API servers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformService {
    pub name: String,
    pub listen_port: u16,
    pub endpoints: Vec<Endpoint>,
}

enum Change {
    Put(ConfigFragment),
    Remove(String),
}

impl Change {
    fn owner(&self) -> &str {
        match self {
            Change::Put(fragment) => &fragment.owner,
            Change::Remove(owner) => owner,
        }
    }
}

/// State guarded by the writer lock.
struct Registry {
    coordinator: ReloadCoordinator,
    apps: BTreeMap<String, Application>,
    services: BTreeMap<String, PlatformService>,
}

impl Registry {
    /// Apply fragment changes and regenerate, undoing them on any failure.
    async fn apply(&self, changes: Vec<Change>) -> FleetResult<()> {
        let store = self.coordinator.store();
        let mut previous: Vec<(String, Option<ConfigFragment>)> = Vec::with_capacity(changes.len());

        for change in &changes {
            let owner = change.owner();
            let result = match store.get(owner) {
                Ok(old) => {
                    previous.push((owner.to_string(), old));
                    match change {
                        Change::Put(fragment) => store.put(fragment),
                        Change::Remove(owner) => store.remove(owner).map(|_| ()),
                    }
                }
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                self.restore(previous);
                return Err(e);
            }
        }

        if let Err(e) = self.coordinator.regenerate().await {
            self.restore(previous);
            return Err(e);
        }
        Ok(())
    }

    /// Put fragments back as they were and rewrite the effective file.
    ///
    /// The proxy is not reloaded; it is still serving the old config.
    fn restore(&self, previous: Vec<(String, Option<ConfigFragment>)>) {
        let store = self.coordinator.store();
        for (owner, fragment) in previous.into_iter().rev() {
            let result = match fragment {
                Some(fragment) => store.put(&fragment),
                None => store.remove(&owner).map(|_| ()),
            };
            if let Err(e) = result {
                error!(%owner, error = %e, "fragment rollback failed");
            }
        }
        match self.coordinator.write_effective() {
            Ok(_) => warn!("fragment changes rolled back"),
            Err(e) => error!(error = %e, "rewriting effective config after rollback failed"),
        }
    }

    /// Name of whoever already listens on `port`.
    fn port_owner(&self, port: u16, start_port: u16) -> Option<&str> {
        self.apps
            .values()
            .find(|app| start_port.checked_add(app.app_number) == Some(port))
            .map(|app| app.name.as_str())
            .or_else(|| {
                self.services
                    .values()
                    .find(|svc| svc.listen_port == port)
                    .map(|svc| svc.name.as_str())
            })
    }
}

/// Owns the fleet's registrations and keeps proxy config and autoscaler in step.
pub struct FleetManager {
    registry: Mutex<Registry>,
    control: Arc<dyn ProxyControl>,
    autoscaler: Arc<AutoScaleController>,
    settings: ManagerSettings,
}

impl FleetManager {
    pub fn new(
        coordinator: ReloadCoordinator,
        autoscaler: Arc<AutoScaleController>,
        settings: ManagerSettings,
    ) -> Self {
        let control = coordinator.control().clone();
        Self {
            registry: Mutex::new(Registry {
                coordinator,
                apps: BTreeMap::new(),
                services: BTreeMap::new(),
            }),
            control,
            autoscaler,
            settings,
        }
    }

    pub fn settings(&self) -> &ManagerSettings {
        &self.settings
    }

    pub fn autoscaler(&self) -> &Arc<AutoScaleController> {
        &self.autoscaler
    }

    /// Fragment owner for an application, e.g. `gae_shop`.
    pub fn app_owner(&self, name: &str) -> String {
        format!("{}{name}", self.settings.app_prefix)
    }

    pub fn listen_port(&self, app_number: u16) -> FleetResult<u16> {
        self.settings.start_port.checked_add(app_number).ok_or_else(|| {
            FleetError::InvalidConfig(format!(
                "app number {app_number} is past the last port after {}",
                self.settings.start_port
            ))
        })
    }

    fn app_fragment(&self, app: &Application) -> FleetResult<ConfigFragment> {
        let port = self.listen_port(app.app_number)?;
        Ok(ListenBlock::new(self.app_owner(&app.name), &self.settings.listen_address, port)
            .with_options(self.settings.server_options)
            .servers(app.endpoints.iter().cloned())
            .into_fragment())
    }

    /// Start managing an application with an empty server pool.
    ///
    /// The autoscaler claims the name first, so a name it already tracks
    /// never reaches the proxy; the claim is released if the proxy rejects
    /// the new listener.
    pub async fn register(
        &self,
        name: &str,
        app_number: u16,
        thresholds: Option<ThresholdConfig>,
    ) -> FleetResult<()> {
        let mut registry = self.registry.lock().await;
        if registry.apps.contains_key(name) {
            return Err(FleetError::DuplicateApplication(name.to_string()));
        }
        let port = self.listen_port(app_number)?;
        if let Some(owner) = registry.port_owner(port, self.settings.start_port) {
            return Err(FleetError::InvalidConfig(format!(
                "port {port} for {name} is already used by {owner}"
            )));
        }

        let app = Application::new(
            name,
            app_number,
            thresholds.unwrap_or(self.settings.default_thresholds),
        );
        let fragment = self.app_fragment(&app)?;

        self.autoscaler.register(name, app.thresholds).await?;
        if let Err(e) = registry.apply(vec![Change::Put(fragment)]).await {
            if let Err(undo) = self.autoscaler.unregister(name).await {
                warn!(app = %name, error = %undo, "autoscaler lost track of rejected application");
            }
            return Err(e);
        }
        info!(app = %name, app_number, port, "application registered");
        registry.apps.insert(name.to_string(), app);
        Ok(())
    }

    /// Replace an application's backend servers.
    pub async fn set_servers(&self, name: &str, endpoints: Vec<Endpoint>) -> FleetResult<()> {
        let mut registry = self.registry.lock().await;
        let mut app = registry
            .apps
            .get(name)
            .cloned()
            .ok_or_else(|| FleetError::UnknownApplication(name.to_string()))?;
        app.endpoints = endpoints;

        registry.apply(vec![Change::Put(self.app_fragment(&app)?)]).await?;

        info!(app = %name, replicas = app.replicas(), "application servers updated");
        registry.apps.insert(name.to_string(), app);
        Ok(())
    }

    /// Stop managing an application and drop its listener.
    pub async fn remove(&self, name: &str) -> FleetResult<()> {
        let mut registry = self.registry.lock().await;
        if !registry.apps.contains_key(name) {
            return Err(FleetError::UnknownApplication(name.to_string()));
        }

        registry.apply(vec![Change::Remove(self.app_owner(name))]).await?;

        registry.apps.remove(name);
        if let Err(e) = self.autoscaler.unregister(name).await {
            warn!(app = %name, error = %e, "application was not tracked by the autoscaler");
        }
        info!(app = %name, "application removed");
        Ok(())
    }

    /// Add or replace a platform service listener.
    ///
    /// Service names share the fragment namespace with applications, so a
    /// name carrying the application prefix is rejected.
    pub async fn register_platform_service(
        &self,
        name: &str,
        listen_port: u16,
        endpoints: Vec<Endpoint>,
    ) -> FleetResult<()> {
        let prefix = &self.settings.app_prefix;
        if !prefix.is_empty() && name.starts_with(prefix.as_str()) {
            return Err(FleetError::InvalidConfig(format!(
                "platform service {name:?} uses the application prefix {prefix:?}"
            )));
        }

        let mut registry = self.registry.lock().await;
        if let Some(owner) = registry.port_owner(listen_port, self.settings.start_port)
            && owner != name
        {
            return Err(FleetError::InvalidConfig(format!(
                "port {listen_port} for {name} is already used by {owner}"
            )));
        }

        let fragment = ListenBlock::new(name, &self.settings.listen_address, listen_port)
            .with_options(self.settings.server_options)
            .servers(endpoints.iter().cloned())
            .into_fragment();
        registry.apply(vec![Change::Put(fragment)]).await?;

        info!(service = %name, port = listen_port, servers = endpoints.len(), "platform service configured");
        registry.services.insert(
            name.to_string(),
            PlatformService {
                name: name.to_string(),
                listen_port,
                endpoints,
            },
        );
        Ok(())
    }

    pub async fn remove_platform_service(&self, name: &str) -> FleetResult<()> {
        let mut registry = self.registry.lock().await;
        if !registry.services.contains_key(name) {
            return Err(FleetError::UnknownApplication(name.to_string()));
        }

        registry.apply(vec![Change::Remove(name.to_string())]).await?;

        registry.services.remove(name);
        info!(service = %name, "platform service removed");
        Ok(())
    }

    /// Drop every listener, application and platform service alike.
    ///
    /// Returns the number of fragments removed.
    pub async fn clear(&self) -> FleetResult<usize> {
        let mut registry = self.registry.lock().await;
        let owners = registry.coordinator.store().owners()?;
        let removed = owners.len();

        registry
            .apply(owners.into_iter().map(Change::Remove).collect())
            .await?;

        let apps = std::mem::take(&mut registry.apps);
        registry.services.clear();
        for name in apps.keys() {
            if let Err(e) = self.autoscaler.unregister(name).await {
                warn!(app = %name, error = %e, "application was not tracked by the autoscaler");
            }
        }
        info!(removed, "fleet configuration cleared");
        Ok(removed)
    }

    /// Managed applications, sorted by name.
    pub async fn applications(&self) -> Vec<Application> {
        self.registry.lock().await.apps.values().cloned().collect()
    }

    pub async fn application(&self, name: &str) -> FleetResult<Application> {
        self.registry
            .lock()
            .await
            .apps
            .get(name)
            .cloned()
            .ok_or_else(|| FleetError::UnknownApplication(name.to_string()))
    }

    /// Platform services, sorted by name.
    pub async fn platform_services(&self) -> Vec<PlatformService> {
        self.registry.lock().await.services.values().cloned().collect()
    }

    pub async fn proxy_running(&self) -> FleetResult<bool> {
        self.control.is_running().await
    }

    /// Restart the proxy. Waits for any in-flight regenerate.
    pub async fn restart_proxy(&self) -> FleetResult<()> {
        let _registry = self.registry.lock().await;
        info!("restarting proxy");
        self.control.restart().await
    }

    pub async fn stop_proxy(&self) -> FleetResult<()> {
        let _registry = self.registry.lock().await;
        info!("stopping proxy");
        self.control.stop().await
    }
}
