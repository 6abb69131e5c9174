//! pwm.rs
//! Hardware PWM access through the pigpio daemon socket.
//!
//! Every request is a 16-byte little-endian frame `(cmd, p1, p2, p3)`; the daemon echoes
//! `(cmd, p1, p2, status)` where a negative status is an error code. `p3` carries the
//! length of an optional extension and is always zero for the commands used here.

use std::{
    io::{self, Read, Write},
    net::{Shutdown, TcpStream, ToSocketAddrs},
    time::Duration,
};

use byteorder::{ByteOrder, LittleEndian};
use log::{debug, trace};

use crate::error::PwmError;

pub const CMD_MODES: u32 = 0;
pub const CMD_PWM: u32 = 5;
pub const CMD_PRS: u32 = 6;
pub const CMD_PFS: u32 = 7;

pub const MODE_OUTPUT: u32 = 1;

const FRAME_LEN: usize = 16;

/// One write issued to a PWM output, as seen by the hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PwmWrite {
    Mode { pin: u32 },
    Frequency { pin: u32, hz: u32 },
    Range { pin: u32, range: u32 },
    Duty { pin: u32, duty: u32 },
}

/// Connection to a PWM provider. Every call is one blocking round trip.
pub trait PwmChannel: Send {
    fn set_mode_output(&mut self, pin: u32) -> Result<(), PwmError>;
    fn set_frequency(&mut self, pin: u32, hz: u32) -> Result<(), PwmError>;
    fn set_range(&mut self, pin: u32, range: u32) -> Result<(), PwmError>;
    fn set_duty(&mut self, pin: u32, duty: u32) -> Result<(), PwmError>;
    /// Close the connection. Further calls fail with `Disconnected`.
    fn disconnect(&mut self);
}

pub fn encode_request(cmd: u32, p1: u32, p2: u32) -> [u8; FRAME_LEN] {
    let mut buf = [0u8; FRAME_LEN];
    LittleEndian::write_u32(&mut buf[0..4], cmd);
    LittleEndian::write_u32(&mut buf[4..8], p1);
    LittleEndian::write_u32(&mut buf[8..12], p2);
    LittleEndian::write_u32(&mut buf[12..16], 0);
    buf
}

/// Status word of a reply frame.
pub fn decode_status(reply: &[u8; FRAME_LEN]) -> i32 {
    LittleEndian::read_i32(&reply[12..16])
}

pub struct PigpioSocket {
    stream: Option<TcpStream>,
}

impl PigpioSocket {
    pub fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self, PwmError> {
        let addr = (host, port).to_socket_addrs()?.next().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("no address for {}:{}", host, port),
            )
        })?;

        let stream = TcpStream::connect_timeout(&addr, timeout)?;
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;
        stream.set_nodelay(true)?;
        debug!("[Pwm] connected to {}", addr);

        Ok(Self {
            stream: Some(stream),
        })
    }

    fn command(&mut self, cmd: u32, p1: u32, p2: u32) -> Result<i32, PwmError> {
        let stream = self.stream.as_mut().ok_or(PwmError::Disconnected)?;

        stream.write_all(&encode_request(cmd, p1, p2))?;
        let mut reply = [0u8; FRAME_LEN];
        stream.read_exact(&mut reply)?;

        let status = decode_status(&reply);
        trace!("[Pwm] cmd={} p1={} p2={} -> {}", cmd, p1, p2, status);
        if status < 0 {
            return Err(PwmError::Rejected { cmd, p1, p2, status });
        }
        Ok(status)
    }
}

impl PwmChannel for PigpioSocket {
    fn set_mode_output(&mut self, pin: u32) -> Result<(), PwmError> {
        self.command(CMD_MODES, pin, MODE_OUTPUT).map(|_| ())
    }

    fn set_frequency(&mut self, pin: u32, hz: u32) -> Result<(), PwmError> {
        // The daemon answers with the nearest frequency it can produce.
        let actual = self.command(CMD_PFS, pin, hz)?;
        if actual as u32 != hz {
            debug!("[Pwm] pin {} frequency {} Hz rounded to {} Hz", pin, hz, actual);
        }
        Ok(())
    }

    fn set_range(&mut self, pin: u32, range: u32) -> Result<(), PwmError> {
        self.command(CMD_PRS, pin, range).map(|_| ())
    }

    fn set_duty(&mut self, pin: u32, duty: u32) -> Result<(), PwmError> {
        self.command(CMD_PWM, pin, duty).map(|_| ())
    }

    fn disconnect(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
            debug!("[Pwm] disconnected");
        }
    }
}

impl Drop for PigpioSocket {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{net::TcpListener, thread};

    /// Minimal daemon: echoes each request and rejects duties above `max_duty`.
    fn fake_daemon(max_duty: u32) -> (u16, thread::JoinHandle<Vec<(u32, u32, u32)>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let handle = thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            let mut seen = Vec::new();
            let mut req = [0u8; FRAME_LEN];
            while conn.read_exact(&mut req).is_ok() {
                let cmd = LittleEndian::read_u32(&req[0..4]);
                let p1 = LittleEndian::read_u32(&req[4..8]);
                let p2 = LittleEndian::read_u32(&req[8..12]);
                seen.push((cmd, p1, p2));

                let status: i32 = match cmd {
                    CMD_PWM if p2 > max_duty => -8,
                    CMD_PFS => 50,
                    _ => 0,
                };
                let mut reply = req;
                LittleEndian::write_i32(&mut reply[12..16], status);
                if conn.write_all(&reply).is_err() {
                    break;
                }
            }
            seen
        });

        (port, handle)
    }

    #[test]
    fn request_frame_layout() {
        let frame = encode_request(CMD_PWM, 13, 10_000);
        assert_eq!(&frame[0..4], &[5, 0, 0, 0]);
        assert_eq!(&frame[4..8], &[13, 0, 0, 0]);
        assert_eq!(LittleEndian::read_u32(&frame[8..12]), 10_000);
        assert_eq!(&frame[12..16], &[0, 0, 0, 0]);
    }

    #[test]
    fn commands_reach_the_daemon_in_order() {
        let (port, daemon) = fake_daemon(40_000);
        let mut pwm = PigpioSocket::connect("127.0.0.1", port, Duration::from_millis(500)).unwrap();

        pwm.set_mode_output(12).unwrap();
        pwm.set_frequency(12, 50).unwrap();
        pwm.set_range(12, 40_000).unwrap();
        pwm.set_duty(12, 3_000).unwrap();
        pwm.disconnect();

        let seen = daemon.join().unwrap();
        assert_eq!(
            seen,
            vec![
                (CMD_MODES, 12, MODE_OUTPUT),
                (CMD_PFS, 12, 50),
                (CMD_PRS, 12, 40_000),
                (CMD_PWM, 12, 3_000),
            ]
        );
    }

    #[test]
    fn negative_status_is_rejected() {
        let (port, daemon) = fake_daemon(100);
        let mut pwm = PigpioSocket::connect("127.0.0.1", port, Duration::from_millis(500)).unwrap();

        let err = pwm.set_duty(13, 10_000).unwrap_err();
        assert!(matches!(
            err,
            PwmError::Rejected { cmd: CMD_PWM, p1: 13, p2: 10_000, status: -8 }
        ));

        pwm.disconnect();
        assert!(matches!(pwm.set_duty(13, 1), Err(PwmError::Disconnected)));
        daemon.join().unwrap();
    }

    #[test]
    fn nothing_listening_is_an_io_error() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let result = PigpioSocket::connect("127.0.0.1", port, Duration::from_millis(200));
        assert!(matches!(result, Err(PwmError::Io(_))));
    }
}
