//! Tello text SDK link.
//!
//! Commands are ASCII datagrams sent to the vehicle's command port. Discrete
//! commands (`command`, `takeoff`, `land`, `forward 30`, ...) are answered with
//! `ok` or an error string. `rc a b c d` velocity setpoints are not answered
//! and are sent fire-and-forget so the control loop never waits on them.
//!
//! Video arrives separately (H.264 on UDP 11111) and is not decoded here.

use anyhow::{anyhow, Context, Result};
use std::io::ErrorKind;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::{Duration, Instant};

use super::Actuator;
use crate::command::Direction;
use crate::steering::Velocity;

pub const DEFAULT_VEHICLE_ADDR: &str = "192.168.10.1:8889";
pub const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 7_000;

/// Range accepted by the `forward|back|left|right` commands.
pub const MOVE_RANGE_CM: std::ops::RangeInclusive<u32> = 20..=500;

const RC_LIMIT: i32 = 100;

#[derive(Clone, Debug)]
pub struct TelloConfig {
    /// Vehicle command endpoint.
    pub addr: String,
    /// Local bind address for the command socket.
    pub bind_addr: String,
    /// How long to wait for `ok` after a discrete command.
    pub command_timeout: Duration,
}

impl Default for TelloConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_VEHICLE_ADDR.to_string(),
            bind_addr: "0.0.0.0:0".to_string(),
            command_timeout: Duration::from_millis(DEFAULT_COMMAND_TIMEOUT_MS),
        }
    }
}

pub struct TelloLink {
    config: TelloConfig,
    target: SocketAddr,
    socket: Option<UdpSocket>,
    commands_sent: u64,
}

impl TelloLink {
    pub fn new(config: TelloConfig) -> Result<Self> {
        let target = config
            .addr
            .to_socket_addrs()
            .with_context(|| format!("resolve vehicle address {}", config.addr))?
            .next()
            .ok_or_else(|| anyhow!("vehicle address {} did not resolve", config.addr))?;
        Ok(Self {
            config,
            target,
            socket: None,
            commands_sent: 0,
        })
    }

    pub fn commands_sent(&self) -> u64 {
        self.commands_sent
    }

    fn socket(&self) -> Result<&UdpSocket> {
        self.socket
            .as_ref()
            .ok_or_else(|| anyhow!("vehicle link not connected; call connect() first"))
    }

    fn send(&mut self, text: &str) -> Result<()> {
        let target = self.target;
        self.socket()?
            .send_to(text.as_bytes(), target)
            .with_context(|| format!("send '{}' to {}", text, target))?;
        self.commands_sent += 1;
        Ok(())
    }

    /// Discard replies left over from earlier commands.
    fn drain_stale(&self) -> Result<()> {
        let socket = self.socket()?;
        socket.set_nonblocking(true)?;
        let mut buf = [0u8; 256];
        loop {
            match socket.recv_from(&mut buf) {
                Ok((len, _)) => log::debug!(
                    "discarding stale vehicle reply '{}'",
                    String::from_utf8_lossy(&buf[..len]).trim()
                ),
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => {
                    socket.set_nonblocking(false)?;
                    return Err(e).context("drain vehicle socket");
                }
            }
        }
        socket.set_nonblocking(false)?;
        Ok(())
    }

    /// Send a discrete command and wait for `ok`.
    fn command(&mut self, text: &str) -> Result<()> {
        self.drain_stale()?;
        self.send(text)?;

        let deadline = Instant::now() + self.config.command_timeout;
        let socket = self.socket()?;
        let mut buf = [0u8; 256];
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(anyhow!(
                    "vehicle did not answer '{}' within {:?}",
                    text,
                    self.config.command_timeout
                ));
            }
            socket.set_read_timeout(Some(remaining))?;
            let (len, from) = match socket.recv_from(&mut buf) {
                Ok(received) => received,
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    continue
                }
                Err(e) => return Err(e).with_context(|| format!("await reply to '{}'", text)),
            };
            if from.ip() != self.target.ip() {
                log::debug!("ignoring datagram from unexpected peer {}", from);
                continue;
            }
            let reply = String::from_utf8_lossy(&buf[..len]).trim().to_string();
            log::debug!("vehicle: '{}' -> '{}'", text, reply);
            return if reply.eq_ignore_ascii_case("ok") {
                Ok(())
            } else {
                Err(anyhow!("vehicle rejected '{}': {}", text, reply))
            };
        }
    }
}

impl Actuator for TelloLink {
    fn name(&self) -> &'static str {
        "tello"
    }

    fn connect(&mut self) -> Result<()> {
        let socket = UdpSocket::bind(&self.config.bind_addr)
            .with_context(|| format!("bind vehicle socket on {}", self.config.bind_addr))?;
        self.socket = Some(socket);
        self.command("command")?;
        log::info!("vehicle link up: {}", self.target);
        Ok(())
    }

    fn start_video(&mut self) -> Result<()> {
        self.command("streamon")
    }

    fn stop_video(&mut self) -> Result<()> {
        self.command("streamoff")
    }

    fn takeoff(&mut self) -> Result<()> {
        self.command("takeoff")
    }

    fn land(&mut self) -> Result<()> {
        self.command("land")
    }

    fn move_relative(&mut self, direction: Direction, distance_cm: u32) -> Result<()> {
        if !MOVE_RANGE_CM.contains(&distance_cm) {
            return Err(anyhow!(
                "move distance {} cm outside {:?}",
                distance_cm,
                MOVE_RANGE_CM
            ));
        }
        self.command(&format!("{} {}", direction.keyword(), distance_cm))
    }

    fn set_velocity(&mut self, v: Velocity) -> Result<()> {
        let clamp = |c: i32| c.clamp(-RC_LIMIT, RC_LIMIT);
        let text = format!(
            "rc {} {} {} {}",
            clamp(v.lateral),
            clamp(v.forward),
            clamp(v.vertical),
            clamp(v.yaw)
        );
        self.send(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    /// Fake vehicle: records every datagram and answers discrete commands.
    fn spawn_fake_vehicle() -> (SocketAddr, mpsc::Receiver<String>) {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        socket
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let addr = socket.local_addr().unwrap();
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let mut buf = [0u8; 256];
            while let Ok((len, from)) = socket.recv_from(&mut buf) {
                let text = String::from_utf8_lossy(&buf[..len]).to_string();
                let reply = match text.as_str() {
                    t if t.starts_with("rc ") => None,
                    "land" => Some("error Not joystick"),
                    _ => Some("ok"),
                };
                if let Some(reply) = reply {
                    let _ = socket.send_to(reply.as_bytes(), from);
                }
                if tx.send(text).is_err() {
                    break;
                }
            }
        });
        (addr, rx)
    }

    fn link_to(addr: SocketAddr) -> TelloLink {
        TelloLink::new(TelloConfig {
            addr: addr.to_string(),
            bind_addr: "127.0.0.1:0".to_string(),
            command_timeout: Duration::from_secs(2),
        })
        .unwrap()
    }

    #[test]
    fn speaks_sdk_text_protocol() {
        let (addr, rx) = spawn_fake_vehicle();
        let mut link = link_to(addr);

        link.connect().unwrap();
        link.start_video().unwrap();
        link.takeoff().unwrap();
        link.move_relative(Direction::Forward, 30).unwrap();
        link.set_velocity(Velocity::new(0, 30, 0, -42)).unwrap();

        let timeout = Duration::from_secs(2);
        let seen: Vec<String> = (0..5).map(|_| rx.recv_timeout(timeout).unwrap()).collect();
        assert_eq!(
            seen,
            vec!["command", "streamon", "takeoff", "forward 30", "rc 0 30 0 -42"]
        );
        assert_eq!(link.commands_sent(), 5);
    }

    #[test]
    fn rejected_command_is_an_error() {
        let (addr, _rx) = spawn_fake_vehicle();
        let mut link = link_to(addr);
        link.connect().unwrap();

        let err = link.land().unwrap_err();
        assert!(err.to_string().contains("Not joystick"), "{}", err);
    }

    #[test]
    fn velocity_components_are_clamped() {
        let (addr, rx) = spawn_fake_vehicle();
        let mut link = link_to(addr);
        link.connect().unwrap();
        link.set_velocity(Velocity::new(-250, 30, 101, 7)).unwrap();

        let timeout = Duration::from_secs(2);
        assert_eq!(rx.recv_timeout(timeout).unwrap(), "command");
        assert_eq!(rx.recv_timeout(timeout).unwrap(), "rc -100 30 100 7");
    }

    #[test]
    fn move_distance_outside_sdk_range_is_refused() {
        let (addr, _rx) = spawn_fake_vehicle();
        let mut link = link_to(addr);
        link.connect().unwrap();
        assert!(link.move_relative(Direction::Left, 5).is_err());
        assert!(link.move_relative(Direction::Left, 600).is_err());
    }

    #[test]
    fn silent_vehicle_blocks_discrete_commands_until_timeout() {
        // Answers the handshake, then never replies again.
        let vehicle = UdpSocket::bind("127.0.0.1:0").unwrap();
        let addr = vehicle.local_addr().unwrap();
        std::thread::spawn(move || {
            let mut buf = [0u8; 256];
            while let Ok((len, from)) = vehicle.recv_from(&mut buf) {
                if &buf[..len] == b"command" {
                    let _ = vehicle.send_to(b"ok", from);
                }
            }
        });

        let timeout = Duration::from_millis(300);
        let mut link = TelloLink::new(TelloConfig {
            addr: addr.to_string(),
            bind_addr: "127.0.0.1:0".to_string(),
            command_timeout: timeout,
        })
        .unwrap();
        link.connect().unwrap();

        let started = Instant::now();
        let err = link.takeoff().unwrap_err();
        assert!(started.elapsed() >= timeout);
        assert!(err.to_string().contains("did not answer 'takeoff'"), "{}", err);

        let started = Instant::now();
        link.set_velocity(Velocity::new(0, 30, 0, 0)).unwrap();
        assert!(started.elapsed() < timeout);
    }

    #[test]
    fn commands_before_connect_fail() {
        let (addr, _rx) = spawn_fake_vehicle();
        let mut link = link_to(addr);
        assert!(link.takeoff().is_err());
    }
}
