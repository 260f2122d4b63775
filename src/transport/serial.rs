use super::{FrameTransport, TransportMode, SERIAL_BAUD, SERIAL_WRITE_TIMEOUT};
use crate::error::TransportError;
use crate::frame::EncodedFrame;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const DEVICE_DIR: &str = "/dev";
const DEVICE_PREFIXES: &[&str] = &["ttyUSB", "ttyACM"];

/// Frames written to a USB serial adapter at 115200 8N1
///
/// Writes are serialised through a mutex so the bytes of one frame are never
/// interleaved with another; each write is bounded by the write timeout.
pub struct SerialTransport {
    port: Mutex<Option<tokio::fs::File>>,
    device: String,
    write_timeout: Duration,
}

impl SerialTransport {
    /// Candidate adapters in `/dev`, sorted by name
    pub fn discover_devices() -> Vec<PathBuf> {
        Self::discover_in(Path::new(DEVICE_DIR))
    }

    fn discover_in(dir: &Path) -> Vec<PathBuf> {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                debug!("Cannot list {}: {}", dir.display(), e);
                return Vec::new();
            }
        };

        let mut devices: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| {
                let name = entry.file_name();
                let name = name.to_string_lossy();
                DEVICE_PREFIXES.iter().any(|prefix| name.starts_with(prefix))
            })
            .map(|entry| entry.path())
            .collect();
        devices.sort();
        devices
    }

    /// Open and configure an adapter; the first discovered one when `device` is `None`
    ///
    /// Discovery, the open and the termios calls all block, so they run on the
    /// blocking pool.
    pub async fn open(device: Option<&Path>) -> Result<Self, TransportError> {
        let device = device.map(Path::to_path_buf);
        let (file, label) = tokio::task::spawn_blocking(move || Self::open_blocking(device))
            .await
            .map_err(|e| TransportError::SerialOpen {
                device: "<pending>".to_string(),
                details: format!("open task failed: {}", e),
            })??;

        info!(device = %label, baud = SERIAL_BAUD, "Serial transport ready");
        Ok(Self::from_file(file, label))
    }

    fn open_blocking(device: Option<PathBuf>) -> Result<(std::fs::File, String), TransportError> {
        let path = match device {
            Some(path) => path,
            None => Self::discover_devices()
                .into_iter()
                .next()
                .ok_or(TransportError::NoSerialDevice)?,
        };
        let label = path.display().to_string();

        let file = open_device(&path).map_err(|e| TransportError::SerialOpen {
            device: label.clone(),
            details: e.to_string(),
        })?;
        configure_line(&file, &label)?;
        Ok((file, label))
    }

    /// Wrap an already-open stream without touching its line settings
    pub fn from_file(file: std::fs::File, label: impl Into<String>) -> Self {
        Self {
            port: Mutex::new(Some(tokio::fs::File::from_std(file))),
            device: label.into(),
            write_timeout: SERIAL_WRITE_TIMEOUT,
        }
    }

    pub fn with_write_timeout(mut self, write_timeout: Duration) -> Self {
        self.write_timeout = write_timeout;
        self
    }

    pub fn device(&self) -> &str {
        &self.device
    }
}

#[async_trait]
impl FrameTransport for SerialTransport {
    fn kind(&self) -> TransportMode {
        TransportMode::UsbSerial
    }

    fn describe(&self) -> String {
        format!("serial://{}", self.device)
    }

    async fn send(&self, frame: &EncodedFrame) -> Result<(), TransportError> {
        let mut guard = self.port.lock().await;
        let port = guard.as_mut().ok_or(TransportError::Closed)?;

        let write = async {
            port.write_all(frame).await?;
            port.flush().await
        };

        match tokio::time::timeout(self.write_timeout, write).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(TransportError::Send(e.to_string())),
            Err(_) => Err(TransportError::Timeout(self.write_timeout)),
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        let Some(mut port) = self.port.lock().await.take() else {
            return Ok(());
        };

        if let Err(e) = port.flush().await {
            warn!(device = %self.device, "Flush on close failed: {}", e);
        }
        debug!(device = %self.device, "Serial transport closed");
        Ok(())
    }
}

#[cfg(unix)]
fn open_device(path: &Path) -> std::io::Result<std::fs::File> {
    use std::os::unix::fs::OpenOptionsExt;

    std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(libc::O_NOCTTY)
        .open(path)
}

#[cfg(not(unix))]
fn open_device(path: &Path) -> std::io::Result<std::fs::File> {
    std::fs::OpenOptions::new().read(true).write(true).open(path)
}

/// Raw mode, 115200 baud, 8 data bits, no parity, one stop bit
#[cfg(unix)]
fn configure_line(file: &std::fs::File, device: &str) -> Result<(), TransportError> {
    use std::os::unix::io::AsRawFd;

    let configure_error = |step: &str| TransportError::SerialConfigure {
        device: device.to_string(),
        details: format!("{}: {}", step, std::io::Error::last_os_error()),
    };

    let fd = file.as_raw_fd();
    // SAFETY: termios is plain data and fd stays open for the borrow of `file`
    unsafe {
        let mut tio: libc::termios = std::mem::zeroed();
        if libc::tcgetattr(fd, &mut tio) != 0 {
            return Err(configure_error("tcgetattr"));
        }

        libc::cfmakeraw(&mut tio);
        tio.c_cflag &= !(libc::PARENB | libc::CSTOPB | libc::CSIZE);
        tio.c_cflag |= libc::CS8 | libc::CLOCAL | libc::CREAD;

        if libc::cfsetispeed(&mut tio, libc::B115200) != 0
            || libc::cfsetospeed(&mut tio, libc::B115200) != 0
        {
            return Err(configure_error("cfsetspeed"));
        }
        if libc::tcsetattr(fd, libc::TCSANOW, &tio) != 0 {
            return Err(configure_error("tcsetattr"));
        }
    }

    debug!(device, "Serial line configured 8N1");
    Ok(())
}

#[cfg(not(unix))]
fn configure_line(_file: &std::fs::File, device: &str) -> Result<(), TransportError> {
    Err(TransportError::SerialConfigure {
        device: device.to_string(),
        details: "serial line configuration is only supported on unix".to_string(),
    })
}
