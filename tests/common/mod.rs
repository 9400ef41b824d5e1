//! Scripted stand-in for the camera firmware, speaking over a duplex pipe.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use camview_client::frame::{LINE_BYTES, LINE_COUNT};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::task::JoinHandle;

/// Content of line `y` as served by the fake device.
pub fn line_pattern(y: usize) -> Vec<u8> {
    (0..LINE_BYTES).map(|i| (y * 3 + i) as u8).collect()
}

/// How the fake answers a given line.
#[derive(Debug, Clone, Copy)]
pub enum LineFault {
    /// Send only this many bytes, this many times, then behave.
    Truncate { bytes: usize, times: usize },
    /// Never answer.
    Silent,
}

#[derive(Debug, Default)]
pub struct DeviceState {
    /// Every command received, without the trailing `\r`.
    pub log: Vec<String>,
    pub registers: HashMap<u8, u8>,
    pub faults: HashMap<usize, LineFault>,
}

#[derive(Clone, Default)]
pub struct FakeCamera {
    pub state: Arc<Mutex<DeviceState>>,
}

impl FakeCamera {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fault(self, line: usize, fault: LineFault) -> Self {
        self.state.lock().unwrap().faults.insert(line, fault);
        self
    }

    pub fn with_register(self, addr: u8, value: u8) -> Self {
        self.state.lock().unwrap().registers.insert(addr, value);
        self
    }

    pub fn log(&self) -> Vec<String> {
        self.state.lock().unwrap().log.clone()
    }

    /// Serve commands until the host side closes.
    pub fn spawn(&self, mut io: DuplexStream, banner: Option<&'static [u8]>) -> JoinHandle<()> {
        let state = self.state.clone();
        tokio::spawn(async move {
            if let Some(banner) = banner {
                io.write_all(banner).await.unwrap();
            }

            let mut command = Vec::new();
            let mut byte = [0u8; 1];
            loop {
                match io.read(&mut byte).await {
                    Ok(0) | Err(_) => return,
                    Ok(_) => {}
                }
                match byte[0] {
                    32..=126 => command.push(byte[0]),
                    13 => {
                        let text = String::from_utf8(std::mem::take(&mut command)).unwrap();
                        let reply = respond(&state, &text);
                        if !reply.is_empty() && io.write_all(&reply).await.is_err() {
                            return;
                        }
                    }
                    _ => {}
                }
            }
        })
    }
}

fn respond(state: &Mutex<DeviceState>, text: &str) -> Vec<u8> {
    let mut state = state.lock().unwrap();
    state.log.push(text.to_string());

    if text == "getimage" {
        return b"OK\r\n".to_vec();
    }

    if let Some(index) = text.strip_prefix("getline ") {
        let y: usize = index.parse().unwrap();
        assert!(y < LINE_COUNT);
        let line = line_pattern(y);
        return match state.faults.get(&y).copied() {
            Some(LineFault::Silent) => Vec::new(),
            Some(LineFault::Truncate { bytes, times }) if times > 0 => {
                state
                    .faults
                    .insert(y, LineFault::Truncate { bytes, times: times - 1 });
                line[..bytes].to_vec()
            }
            _ => line,
        };
    }

    if let Some(addr) = text.strip_prefix("regr 0x") {
        let addr = u8::from_str_radix(addr, 16).unwrap();
        let value = state.registers.get(&addr).copied().unwrap_or(0);
        return format!("0x{:02x} 0x{:02x}\r\n", addr, value).into_bytes();
    }

    if let Some(args) = text.strip_prefix("regw 0x") {
        let addr = u8::from_str_radix(&args[..2], 16).unwrap();
        let value = u8::from_str_radix(&args[5..], 16).unwrap();
        state.registers.insert(addr, value);
        return format!("0x{:02x} 0x{:02x}\r\n", addr, value).into_bytes();
    }

    b"ERR\r\n".to_vec()
}
