use super::EmsDriver;
use crate::engine::{ChargeLimits, CommandSet};
use std::time::{Duration, Instant};

impl EmsDriver {
    /// Write charge limits when they changed or the refresh period elapsed
    pub(crate) async fn apply_charge_limits(&mut self, limits: &ChargeLimits, now: Instant) {
        let refresh = Duration::from_secs(self.config.hardware.charge_refresh_secs);
        let changed = self.last_charge.as_ref() != Some(limits);
        let stale = self
            .last_charge_write
            .is_none_or(|t| now.saturating_duration_since(t) >= refresh);
        if !changed && !stale {
            return;
        }

        match self.inverter.write_charge_limits(limits).await {
            Ok(()) => {
                if changed {
                    self.logger.info(&format!(
                        "Charge limits: max {} A, grid {} A",
                        limits.max_charge_amps, limits.grid_charge_amps
                    ));
                }
                self.last_charge = Some(*limits);
                self.last_charge_write = Some(now);
                self.charge_error = None;
            }
            Err(e) => {
                self.logger
                    .error(&format!("Failed to write charge limits: {}", e));
                // Forget the acknowledged value so the next cycle retries
                self.last_charge = None;
                self.charge_error = Some(e.to_string());
            }
        }
    }

    /// Switch every plug whose desired state differs from the last one it confirmed
    pub(crate) async fn dispatch_outlets(&mut self, commands: &CommandSet) {
        for cmd in &commands.outlets {
            if self.acked.get(&cmd.id) == Some(&Some(cmd.on)) {
                continue;
            }
            let Some(plug) = self.plugs.get(&cmd.id).cloned() else {
                continue;
            };
            match plug.set_state(cmd.on).await {
                Ok(()) => {
                    self.logger.info(&format!(
                        "Outlet {} switched {} ({})",
                        cmd.id,
                        if cmd.on { "on" } else { "off" },
                        cmd.reason
                    ));
                    self.acked.insert(cmd.id.clone(), Some(cmd.on));
                    self.dispatch_errors.remove(&cmd.id);
                }
                Err(e) => {
                    self.logger
                        .error(&format!("Failed to switch outlet {}: {}", cmd.id, e));
                    self.acked.insert(cmd.id.clone(), None);
                    self.dispatch_errors.insert(cmd.id.clone(), e.to_string());
                }
            }
        }
    }
}
