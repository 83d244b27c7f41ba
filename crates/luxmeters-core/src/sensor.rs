//! Sensor registry and a common facade over both drivers

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use tracing::{info, warn};

use crate::cl200a::{Cl200a, Xyz};
use crate::config::LuxConfig;
use crate::demo::{SimulatedCl200a, SimulatedUt382};
use crate::error::{LuxError, TransportError};
use crate::transport::{find_ports_by_manufacturer, PortInfo, SerialTransport, Transport};
use crate::ut382::Ut382;

/// Illuminance the demo devices hover around
pub const DEMO_LUX: f64 = 500.0;

/// Supported instruments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorModel {
    Ut382,
    Cl200a,
}

/// What a sensor can measure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Lux,
    Xyz,
    DeltaUv,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Capability::Lux => "lux",
            Capability::Xyz => "xyz",
            Capability::DeltaUv => "delta_uv",
        })
    }
}

impl SensorModel {
    /// Every supported model
    pub const ALL: [SensorModel; 2] = [SensorModel::Ut382, SensorModel::Cl200a];

    /// Short name used on the command line
    pub fn name(&self) -> &'static str {
        match self {
            SensorModel::Ut382 => "ut382",
            SensorModel::Cl200a => "cl200a",
        }
    }

    /// Display name
    pub fn label(&self) -> &'static str {
        match self {
            SensorModel::Ut382 => "Uni-T UT382",
            SensorModel::Cl200a => "Konica Minolta CL-200A",
        }
    }

    /// Quantities this model reports
    pub fn capabilities(&self) -> &'static [Capability] {
        match self {
            SensorModel::Ut382 => &[Capability::Lux],
            SensorModel::Cl200a => &[Capability::Lux, Capability::Xyz, Capability::DeltaUv],
        }
    }

    /// Whether the model reports `capability`
    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }

    fn unsupported(&self, capability: Capability) -> LuxError {
        LuxError::Unsupported {
            model: self.label(),
            capability: match capability {
                Capability::Lux => "lux",
                Capability::Xyz => "xyz",
                Capability::DeltaUv => "delta_uv",
            },
        }
    }
}

impl fmt::Display for SensorModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SensorModel {
    type Err = LuxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SensorModel::ALL
            .into_iter()
            .find(|model| model.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| LuxError::Config(format!("unknown sensor model {:?}", s)))
    }
}

/// Pick a port: the explicit one, else the first port from `manufacturer`
pub fn resolve_port(explicit: Option<&str>, manufacturer: &str) -> Result<String, LuxError> {
    if let Some(port) = explicit {
        return Ok(port.to_string());
    }
    choose_port(find_ports_by_manufacturer(manufacturer), manufacturer)
}

fn choose_port(candidates: Vec<PortInfo>, manufacturer: &str) -> Result<String, LuxError> {
    let mut candidates = candidates.into_iter();
    let Some(first) = candidates.next() else {
        return Err(TransportError::PortNotFound(manufacturer.to_string()).into());
    };
    let others: Vec<String> = candidates.map(|p| p.name).collect();
    if !others.is_empty() {
        warn!(
            "Several {} devices found, using {} (also: {})",
            manufacturer,
            first.name,
            others.join(", ")
        );
    }
    Ok(first.name)
}

/// An open instrument of either model
pub enum Sensor {
    Cl200a(Cl200a<Box<dyn Transport>>),
    Ut382(Ut382<Box<dyn Transport>>),
}

impl Sensor {
    /// Find the device's port and open it
    pub fn open(model: SensorModel, config: &LuxConfig) -> Result<Self, LuxError> {
        let port = match model {
            SensorModel::Cl200a => {
                resolve_port(config.cl200a.port.as_deref(), &config.cl200a.manufacturer)?
            }
            SensorModel::Ut382 => {
                resolve_port(config.ut382.port.as_deref(), &config.ut382.manufacturer)?
            }
        };
        Self::open_port(model, &port, config)
    }

    /// Open a known port
    pub fn open_port(model: SensorModel, port: &str, config: &LuxConfig) -> Result<Self, LuxError> {
        info!("Opening {} on {}", model.label(), port);
        let settings = match model {
            SensorModel::Cl200a => config.cl200a.transport(port),
            SensorModel::Ut382 => config.ut382.transport(port),
        };
        let transport = SerialTransport::open(&settings)?;
        Self::with_transport(model, Box::new(transport), config)
    }

    /// A simulated device of the given model
    pub fn demo(model: SensorModel, config: &LuxConfig) -> Result<Self, LuxError> {
        info!("Using simulated {}", model.label());
        let transport: Box<dyn Transport> = match model {
            SensorModel::Cl200a => Box::new(SimulatedCl200a::new(DEMO_LUX)),
            SensorModel::Ut382 => Box::new(SimulatedUt382::new(DEMO_LUX)?),
        };
        Self::with_transport(model, transport, config)
    }

    /// Build the driver over any transport
    pub fn with_transport(
        model: SensorModel,
        transport: Box<dyn Transport>,
        config: &LuxConfig,
    ) -> Result<Self, LuxError> {
        Ok(match model {
            SensorModel::Cl200a => {
                Sensor::Cl200a(Cl200a::with_transport(transport, config.cl200a.clone())?)
            }
            SensorModel::Ut382 => {
                Sensor::Ut382(Ut382::with_transport(transport, config.ut382.clone())?)
            }
        })
    }

    /// Model of the open device
    pub fn model(&self) -> SensorModel {
        match self {
            Sensor::Cl200a(_) => SensorModel::Cl200a,
            Sensor::Ut382(_) => SensorModel::Ut382,
        }
    }

    /// False once the driver has faulted
    pub fn is_alive(&self) -> bool {
        match self {
            Sensor::Cl200a(meter) => meter.is_alive(),
            Sensor::Ut382(meter) => meter.is_alive(),
        }
    }

    /// Release the serial port
    pub fn close(&mut self) {
        match self {
            Sensor::Cl200a(meter) => meter.close(),
            Sensor::Ut382(meter) => meter.close(),
        }
    }

    /// Illuminance in lux; for the UT382 this is the next live reading
    pub fn lux(&mut self) -> Result<Option<f64>, LuxError> {
        match self {
            Sensor::Cl200a(meter) => meter.lux(),
            Sensor::Ut382(meter) => match meter.live_monitor().next() {
                Some(reading) => Ok(reading?.lux),
                None => Ok(None),
            },
        }
    }

    /// Tristimulus values
    pub fn xyz(&mut self) -> Result<Option<Xyz>, LuxError> {
        match self {
            Sensor::Cl200a(meter) => meter.xyz(),
            Sensor::Ut382(_) => Err(SensorModel::Ut382.unsupported(Capability::Xyz)),
        }
    }

    /// Distance from the Planckian locus
    pub fn delta_uv(&mut self) -> Result<Option<f64>, LuxError> {
        match self {
            Sensor::Cl200a(meter) => Ok(meter.ev_tcp_delta_uv()?.map(|r| r.delta_uv)),
            Sensor::Ut382(_) => Err(SensorModel::Ut382.unsupported(Capability::DeltaUv)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn port(name: &str) -> PortInfo {
        PortInfo::bare(name.to_string())
    }

    #[test]
    fn test_model_names() {
        assert_eq!("ut382".parse::<SensorModel>().unwrap(), SensorModel::Ut382);
        assert_eq!("CL200A".parse::<SensorModel>().unwrap(), SensorModel::Cl200a);
        assert!(matches!("t10".parse::<SensorModel>(), Err(LuxError::Config(_))));
    }

    #[test]
    fn test_capability_registry() {
        assert_eq!(SensorModel::Ut382.capabilities(), &[Capability::Lux]);
        assert!(SensorModel::Cl200a.supports(Capability::DeltaUv));
        assert!(!SensorModel::Ut382.supports(Capability::Xyz));
    }

    #[test]
    fn test_port_choice() {
        assert!(matches!(
            choose_port(vec![], "Silicon Labs"),
            Err(LuxError::Transport(TransportError::PortNotFound(_)))
        ));
        let chosen = choose_port(
            vec![port("/dev/ttyUSB0"), port("/dev/ttyUSB1")],
            "Silicon Labs",
        )
        .unwrap();
        assert_eq!(chosen, "/dev/ttyUSB0");
        assert_eq!(resolve_port(Some("COM4"), "anything").unwrap(), "COM4");
    }

    #[test]
    fn test_ut382_lacks_color() {
        let sim = SimulatedUt382::seeded(DEMO_LUX, 1).unwrap();
        let mut sensor =
            Sensor::with_transport(SensorModel::Ut382, Box::new(sim), &LuxConfig::default())
                .unwrap();
        assert!(sensor.lux().unwrap().is_some());
        assert!(matches!(
            sensor.xyz(),
            Err(LuxError::Unsupported { capability: "xyz", .. })
        ));
        assert!(matches!(sensor.delta_uv(), Err(LuxError::Unsupported { .. })));
    }

    #[test]
    fn test_cl200a_facade() {
        let sim = SimulatedCl200a::seeded(DEMO_LUX, 1);
        let mut sensor =
            Sensor::with_transport(SensorModel::Cl200a, Box::new(sim), &LuxConfig::default())
                .unwrap();
        assert_eq!(sensor.model(), SensorModel::Cl200a);
        assert!(sensor.lux().unwrap().is_some());
        assert!(sensor.xyz().unwrap().is_some());
        assert_eq!(sensor.delta_uv().unwrap(), Some(0.0));
    }

    #[test]
    fn test_close_ends_both_models() {
        let config = LuxConfig::default();
        let sensors = [
            Sensor::with_transport(
                SensorModel::Cl200a,
                Box::new(SimulatedCl200a::seeded(DEMO_LUX, 2)),
                &config,
            )
            .unwrap(),
            Sensor::with_transport(
                SensorModel::Ut382,
                Box::new(SimulatedUt382::seeded(DEMO_LUX, 2).unwrap()),
                &config,
            )
            .unwrap(),
        ];
        for mut sensor in sensors {
            assert!(sensor.is_alive());
            sensor.close();
            assert!(!sensor.is_alive(), "{}", sensor.model());
            assert!(sensor.lux().is_err(), "{}", sensor.model());
        }
    }
}
