use super::{DriverCommand, EmsDriver};
use crate::config::Config;
use crate::engine::OutletMode;
use crate::error::{HeliosError, Result};
use std::collections::HashMap;
use std::path::PathBuf;

impl EmsDriver {
    pub(crate) fn handle_command(&mut self, cmd: DriverCommand) {
        match cmd {
            DriverCommand::SetOutletMode { id, mode } => self.set_outlet_mode(&id, mode),
            DriverCommand::ReloadConfig { path } => {
                if let Err(e) = self.reload_config(path) {
                    self.logger
                        .error(&format!("Configuration reload rejected: {}", e));
                    self.last_error = Some(e.to_string());
                }
            }
        }
    }

    pub(crate) fn set_outlet_mode(&mut self, id: &str, mode: OutletMode) {
        if self.config.outlet(id).is_none() {
            self.logger
                .warn(&format!("Ignoring mode change for unknown outlet {}", id));
            return;
        }
        if self.overrides.mode(id) != mode {
            self.logger
                .info(&format!("Outlet {} mode set to {:?}", id, mode));
        }
        self.overrides.set(id, mode);
    }

    /// Load, validate and apply a configuration file.
    /// On any error the running configuration stays untouched.
    pub(crate) fn reload_config(&mut self, path: Option<PathBuf>) -> Result<()> {
        let path = path
            .or_else(|| self.config_path.clone())
            .or_else(|| Config::resolve_path().map(PathBuf::from))
            .ok_or_else(|| HeliosError::config("No configuration file to reload"))?;
        let config = Config::load_validated(&path)?;
        self.apply_config(config)?;
        self.config_path = Some(path);
        Ok(())
    }

    /// Swap in a validated configuration, rebuilding plugs whose endpoint changed
    pub(crate) fn apply_config(&mut self, config: Config) -> Result<()> {
        let mut plugs = HashMap::with_capacity(config.outlets.len());
        let mut rebuilt = Vec::new();
        for outlet in &config.outlets {
            let unchanged = self
                .config
                .outlet(&outlet.id)
                .is_some_and(|old| old.endpoint == outlet.endpoint);
            let plug = match self.plugs.get(&outlet.id) {
                Some(existing) if unchanged => existing.clone(),
                _ => {
                    rebuilt.push(outlet.id.clone());
                    (self.plug_factory)(outlet)?
                }
            };
            plugs.insert(outlet.id.clone(), plug);
        }

        // New endpoint: physical state unknown until confirmed
        for id in &rebuilt {
            self.acked.remove(id);
        }

        if config.inverter != self.config.inverter {
            self.logger
                .warn("Inverter connection settings changed; restart to apply them");
        }
        self.inverter.apply_register_map(&config.registers);

        let ids: Vec<&str> = config.outlets.iter().map(|o| o.id.as_str()).collect();
        self.overrides.retain_known(&ids);
        self.acked.retain(|id, _| ids.contains(&id.as_str()));
        self.dispatch_errors.retain(|id, _| ids.contains(&id.as_str()));

        // Force a charge limit rewrite under the new limits
        self.last_charge = None;
        self.plugs = plugs;
        self.logger.info(&format!(
            "Configuration applied: {} outlet(s), poll {} ms",
            config.outlets.len(),
            config.poll_interval_ms
        ));
        self.config = config;
        Ok(())
    }
}
