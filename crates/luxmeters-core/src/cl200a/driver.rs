//! CL-200A driver
//!
//! Construction runs the handshake (PC connection, hold, EXT mode). After
//! that every query is one EXT trigger plus one read command.

use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::color::{cct_with, CctMethod};
use super::commands::CommandId;
use super::frame::MeasurementFrame;
use crate::config::{Cl200aConfig, HandshakePolicy};
use crate::error::{DeviceFault, LuxError, TransportError};
use crate::transport::{SerialTransport, Transport};

/// Handshake progress; `Faulted` is terminal, as is `Disconnected` after [`Cl200a::close`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HandshakeState {
    Disconnected,
    PcConnected,
    Held,
    ExtMode,
    Ready,
    Faulted,
}

/// Tristimulus values
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Xyz {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Result of the EV/TCP/Δuv read command
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EvTcpDeltaUv {
    /// Illuminance in lux
    pub ev: f64,
    /// Correlated colour temperature in kelvin
    pub tcp: f64,
    pub delta_uv: f64,
}

/// Konica Minolta CL-200A chroma meter
pub struct Cl200a<T: Transport = SerialTransport> {
    transport: T,
    config: Cl200aConfig,
    state: HandshakeState,
}

impl Cl200a<SerialTransport> {
    /// Open `port` with the configured line settings and run the handshake
    pub fn open(port: &str, config: Cl200aConfig) -> Result<Self, LuxError> {
        let transport = SerialTransport::open(&config.transport(port))?;
        Self::with_transport(transport, config)
    }
}

impl<T: Transport> Cl200a<T> {
    /// Run the handshake over an already open transport.
    ///
    /// Nothing is returned unless the meter reached EXT mode (or the lenient
    /// policy let a missing acknowledgement through).
    pub fn with_transport(transport: T, config: Cl200aConfig) -> Result<Self, LuxError> {
        let mut meter = Self {
            transport,
            config,
            state: HandshakeState::Disconnected,
        };
        if let Err(e) = meter.handshake() {
            meter.state = HandshakeState::Faulted;
            meter.transport.close();
            return Err(e);
        }
        Ok(meter)
    }

    /// Current handshake state
    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// False once the driver has faulted or been closed; it never recovers
    pub fn is_alive(&self) -> bool {
        !matches!(
            self.state,
            HandshakeState::Faulted | HandshakeState::Disconnected
        )
    }

    /// Release the port. Later queries fail with [`LuxError::Faulted`].
    pub fn close(&mut self) {
        if self.transport.is_open() {
            debug!("closing CL-200A");
        }
        self.transport.close();
        if self.state != HandshakeState::Faulted {
            self.state = HandshakeState::Disconnected;
        }
    }

    /// Give the transport back, e.g. to reopen after a power cycle
    pub fn into_transport(self) -> T {
        self.transport
    }

    fn handshake(&mut self) -> Result<(), LuxError> {
        self.connect_pc()?;
        self.hold()?;
        self.enter_ext_mode()?;
        self.state = HandshakeState::Ready;
        info!("CL-200A ready in EXT mode");
        Ok(())
    }

    /// Switch the meter to PC connection mode (command 54)
    fn connect_pc(&mut self) -> Result<(), LuxError> {
        let request = CommandId::PcConnect.frame();
        let expected = CommandId::PcConnectAck.frame();
        let settle = self.config.mode_settle();

        for attempt in 1..=2 {
            self.transport.write(&request, settle)?;
            let reply = self.transport.read_line()?;
            self.transport.reset_buffers()?;

            if contains(&reply, &expected) {
                debug!("PC connection acknowledged");
                break;
            }
            if attempt == 1 {
                warn!("CL-200A did not acknowledge PC connection mode, trying once more");
                continue;
            }
            match self.config.handshake_policy {
                HandshakePolicy::Lenient => {
                    error!("Konica Minolta CL-200A has an error. Please verify USB cable.");
                }
                HandshakePolicy::Strict => {
                    return Err(LuxError::MalformedFrame(format!(
                        "no PC connection acknowledgement, got {:?}",
                        String::from_utf8_lossy(&reply)
                    )));
                }
            }
        }

        self.state = HandshakeState::PcConnected;
        Ok(())
    }

    /// Set hold status (command 55); the meter sends no reply
    fn hold(&mut self) -> Result<(), LuxError> {
        self.transport.reset_buffers()?;
        self.transport
            .write(&CommandId::Hold.frame(), self.config.mode_settle())?;
        self.state = HandshakeState::Held;
        Ok(())
    }

    /// Set EXT mode (command 40). Needs hold status first; error code 4 means
    /// hold was not applied, so hold is sent again before the second attempt.
    fn enter_ext_mode(&mut self) -> Result<(), LuxError> {
        let request = CommandId::SetExtMode.frame();
        self.transport.reset_buffers()?;

        for _ in 0..2 {
            self.transport.write(&request, self.config.ext_settle())?;
            let reply = self.transport.read_line()?;
            match reply.get(6).copied() {
                Some(b'4') => {
                    warn!("EXT mode rejected (hold not applied), re-entering hold mode");
                    self.hold()?;
                }
                Some(code @ (b'1' | b'2' | b'3')) => {
                    error!("Set hold mode error");
                    return Err(DeviceFault::PowerCycleRequired { code: code as char }.into());
                }
                _ => {
                    self.state = HandshakeState::ExtMode;
                    return Ok(());
                }
            }
        }

        match self.config.handshake_policy {
            HandshakePolicy::Lenient => {
                warn!("CL-200A kept rejecting EXT mode, continuing anyway");
                self.state = HandshakeState::ExtMode;
                Ok(())
            }
            HandshakePolicy::Strict => Err(DeviceFault::ExtModeRejected.into()),
        }
    }

    /// Trigger one EXT measurement and read it back with `read_command`.
    ///
    /// `Ok(None)` means the meter sent nothing this time; try again later.
    pub fn perform_measurement(
        &mut self,
        read_command: CommandId,
    ) -> Result<Option<MeasurementFrame>, LuxError> {
        if !self.is_alive() {
            return Err(LuxError::Faulted);
        }

        let reply = match self.exchange(read_command) {
            Ok(reply) => reply,
            Err(e) => {
                error!("Connection to luxmeter was lost: {}", e);
                self.state = HandshakeState::Faulted;
                self.transport.close();
                return Err(e.into());
            }
        };

        if reply.is_empty() {
            debug!("no reply to {}", read_command);
            return Ok(None);
        }
        debug!("got raw data: {:?}", String::from_utf8_lossy(&reply).trim_end());

        match MeasurementFrame::parse(&reply) {
            Err(LuxError::Device(fault @ DeviceFault::PowerCycleRequired { .. })) => {
                error!("{}", fault);
                self.state = HandshakeState::Faulted;
                Err(fault.into())
            }
            other => other.map(Some),
        }
    }

    fn exchange(&mut self, read_command: CommandId) -> Result<Vec<u8>, TransportError> {
        self.transport.reset_buffers()?;
        self.transport
            .write(&CommandId::ExtTrigger.frame(), self.config.mode_settle())?;
        self.transport
            .write(&read_command.frame(), std::time::Duration::ZERO)?;
        self.transport.read_line()
    }

    /// Illuminance in lux
    pub fn lux(&mut self) -> Result<Option<f64>, LuxError> {
        let Some(frame) = self.perform_measurement(CommandId::ReadLux)? else {
            return Ok(None);
        };
        let lux = frame.scaled_value()?;
        debug!("returning {} lux", lux);
        Ok(Some(lux))
    }

    /// X, Y, Z tristimulus values
    pub fn xyz(&mut self) -> Result<Option<Xyz>, LuxError> {
        let Some(frame) = self.perform_measurement(CommandId::ReadXyz)? else {
            return Ok(None);
        };
        let xyz = Xyz {
            x: frame.first_tenths()?,
            y: frame.second_tenths()?,
            z: frame.third_tenths()?,
        };
        debug!("X: {}, Y: {}, Z: {}", xyz.x, xyz.y, xyz.z);
        Ok(Some(xyz))
    }

    /// Illuminance, correlated colour temperature and Δuv
    pub fn ev_tcp_delta_uv(&mut self) -> Result<Option<EvTcpDeltaUv>, LuxError> {
        let Some(frame) = self.perform_measurement(CommandId::ReadEvTcpDeltaUv)? else {
            return Ok(None);
        };
        let reading = EvTcpDeltaUv {
            ev: frame.scaled_value()?,
            tcp: frame.second_tenths()?,
            delta_uv: frame.third_tenths()?,
        };
        debug!(
            "Illuminance: {} lux, TCP: {}, DeltaUV: {}",
            reading.ev, reading.tcp, reading.delta_uv
        );
        Ok(Some(reading))
    }

    /// CCT from a fresh XYZ reading (McCamy)
    pub fn cct(&mut self) -> Result<Option<f64>, LuxError> {
        self.cct_with(CctMethod::McCamy)
    }

    /// CCT from a fresh XYZ reading with the given approximation
    pub fn cct_with(&mut self, method: CctMethod) -> Result<Option<f64>, LuxError> {
        Ok(self.xyz()?.map(|xyz| cct_with(method, xyz.x, xyz.y, xyz.z)))
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    !needle.is_empty() && haystack.windows(needle.len()).any(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::script::{Event, ScriptedTransport};
    use std::time::Duration;

    fn ack() -> Vec<u8> {
        CommandId::PcConnectAck.frame()
    }

    fn ext_reply(code: char) -> Vec<u8> {
        format!("\x0200401{}0 \x0300\r\n", code).into_bytes()
    }

    fn lux_reply(data: &str) -> Vec<u8> {
        format!("\x0200021 00{}\x0300\r\n", data).into_bytes()
    }

    fn ready(extra: ScriptedTransport) -> Cl200a<ScriptedTransport> {
        let mut transport = ScriptedTransport::new().reply(ack()).reply(ext_reply('0'));
        transport.replies.extend(extra.replies);
        Cl200a::with_transport(transport, Cl200aConfig::default()).unwrap()
    }

    #[test]
    fn test_handshake_sequence() {
        let meter = ready(ScriptedTransport::new());
        assert_eq!(meter.state(), HandshakeState::Ready);

        let transport = meter.into_transport();
        let sent: Vec<(Vec<u8>, Duration)> = transport.written;
        assert_eq!(
            sent,
            vec![
                (CommandId::PcConnect.frame(), Duration::from_millis(500)),
                (CommandId::Hold.frame(), Duration::from_millis(500)),
                (CommandId::SetExtMode.frame(), Duration::from_millis(125)),
            ]
        );
    }

    #[test]
    fn test_ext_mode_retries_hold_on_code_4() {
        let transport = ScriptedTransport::new()
            .reply(ack())
            .reply(ext_reply('4'))
            .reply(ext_reply('0'));
        let meter = Cl200a::with_transport(transport, Cl200aConfig::default()).unwrap();
        let ids: Vec<Vec<u8>> = meter.into_transport().written.into_iter().map(|(b, _)| b).collect();
        assert_eq!(
            ids,
            vec![
                CommandId::PcConnect.frame(),
                CommandId::Hold.frame(),
                CommandId::SetExtMode.frame(),
                CommandId::Hold.frame(),
                CommandId::SetExtMode.frame(),
            ]
        );
    }

    #[test]
    fn test_ext_mode_power_cycle_error_aborts() {
        let transport = ScriptedTransport::new().reply(ack()).reply(ext_reply('2'));
        let err = Cl200a::with_transport(transport, Cl200aConfig::default()).err().unwrap();
        assert!(matches!(
            err,
            LuxError::Device(DeviceFault::PowerCycleRequired { code: '2' })
        ));
    }

    #[test]
    fn test_strict_policy_rejects_missing_ack() {
        let config = Cl200aConfig {
            handshake_policy: HandshakePolicy::Strict,
            ..Cl200aConfig::default()
        };
        let err = Cl200a::with_transport(ScriptedTransport::new(), config).err();
        assert!(matches!(err, Some(LuxError::MalformedFrame(_))));
    }

    #[test]
    fn test_lenient_policy_proceeds_without_ack() {
        let meter = Cl200a::with_transport(ScriptedTransport::new(), Cl200aConfig::default()).unwrap();
        assert!(meter.is_alive());
        // Both connection attempts were sent
        let connects = meter
            .into_transport()
            .written
            .iter()
            .filter(|(b, _)| *b == CommandId::PcConnect.frame())
            .count();
        assert_eq!(connects, 2);
    }

    #[test]
    fn test_lux_measurement() {
        let mut meter = ready(ScriptedTransport::new().reply(lux_reply("+05236")));
        assert_eq!(meter.lux().unwrap(), Some(52300.0));

        let transport = meter.into_transport();
        let tail = &transport.written[transport.written.len() - 2..];
        assert_eq!(tail[0], (CommandId::ExtTrigger.frame(), Duration::from_millis(500)));
        assert_eq!(tail[1], (CommandId::ReadLux.frame(), Duration::ZERO));

        // Stale input is flushed before the trigger goes out
        let events = &transport.events[transport.events.len() - 3..];
        assert_eq!(
            events,
            &[
                Event::Reset,
                Event::Write(CommandId::ExtTrigger.frame()),
                Event::Write(CommandId::ReadLux.frame()),
            ]
        );
    }

    #[test]
    fn test_every_query_flushes_first() {
        let mut meter = ready(
            ScriptedTransport::new()
                .reply(lux_reply("+05236"))
                .reply(lux_reply("+05236")),
        );
        let handshake_events = meter.transport.events.len();
        meter.lux().unwrap();
        meter.lux().unwrap();

        let events = &meter.transport.events[handshake_events..];
        let triggers: Vec<usize> = events
            .iter()
            .enumerate()
            .filter(|(_, e)| **e == Event::Write(CommandId::ExtTrigger.frame()))
            .map(|(i, _)| i)
            .collect();
        assert_eq!(triggers.len(), 2);
        for i in triggers {
            assert_eq!(events[i - 1], Event::Reset);
        }
    }

    #[test]
    fn test_lenient_policy_accepts_double_ext_rejection() {
        let transport = ScriptedTransport::new()
            .reply(ack())
            .reply(ext_reply('4'))
            .reply(ext_reply('4'))
            .reply(lux_reply("+05236"));
        let mut meter = Cl200a::with_transport(transport, Cl200aConfig::default()).unwrap();
        assert_eq!(meter.state(), HandshakeState::Ready);
        assert_eq!(meter.lux().unwrap(), Some(52300.0));

        let written: Vec<Vec<u8>> = meter.into_transport().written.into_iter().map(|(b, _)| b).collect();
        let holds = written.iter().filter(|b| **b == CommandId::Hold.frame()).count();
        let ext = written.iter().filter(|b| **b == CommandId::SetExtMode.frame()).count();
        // Initial hold plus one after each rejection
        assert_eq!(holds, 3);
        assert_eq!(ext, 2);
    }

    #[test]
    fn test_failed_write_faults_driver() {
        let mut meter = ready(ScriptedTransport::new().reply(lux_reply("+05236")));
        meter.transport.fail_writes = true;

        assert!(matches!(
            meter.lux(),
            Err(LuxError::Transport(TransportError::Closed))
        ));
        assert_eq!(meter.state(), HandshakeState::Faulted);
        assert!(meter.transport.closed);
        assert!(matches!(meter.lux(), Err(LuxError::Faulted)));
    }

    #[test]
    fn test_close_releases_port() {
        let mut meter = ready(ScriptedTransport::new().reply(lux_reply("+05236")));
        meter.close();
        assert!(!meter.is_alive());
        assert_eq!(meter.state(), HandshakeState::Disconnected);
        assert!(matches!(meter.lux(), Err(LuxError::Faulted)));
        assert!(meter.into_transport().closed);
    }

    #[test]
    fn test_empty_reply_is_retryable() {
        let mut meter = ready(ScriptedTransport::new());
        assert_eq!(meter.lux().unwrap(), None);
        assert!(meter.is_alive());
    }

    #[test]
    fn test_transport_loss_is_sticky() {
        let mut meter = ready(ScriptedTransport::new().fail());
        assert!(matches!(meter.lux(), Err(LuxError::Transport(_))));
        assert_eq!(meter.state(), HandshakeState::Faulted);
        assert!(matches!(meter.lux(), Err(LuxError::Faulted)));
    }

    #[test]
    fn test_power_cycle_error_faults_driver() {
        let mut meter = ready(
            ScriptedTransport::new().reply(b"\x0200021300+05236\x0300\r\n".to_vec()),
        );
        assert!(matches!(meter.lux(), Err(LuxError::Device(_))));
        assert!(!meter.is_alive());
    }

    #[test]
    fn test_xyz_and_cct() {
        let mut meter = ready(
            ScriptedTransport::new()
                .reply(lux_reply("+03004+03004+04004"))
                .reply(lux_reply("+03004+03004+04004")),
        );
        let xyz = meter.xyz().unwrap().unwrap();
        assert_eq!(xyz, Xyz { x: 30.0, y: 30.0, z: 40.0 });
        let cct = meter.cct().unwrap().unwrap();
        assert!((cct - 7731.878886628698).abs() < 1e-6);
    }

    #[test]
    fn test_ev_tcp_delta_uv() {
        let mut meter = ready(ScriptedTransport::new().reply(lux_reply("+05235+65004+00034")));
        let reading = meter.ev_tcp_delta_uv().unwrap().unwrap();
        assert_eq!(reading.ev, 5230.0);
        assert_eq!(reading.tcp, 650.0);
        assert_eq!(reading.delta_uv, 0.3);
    }
}
