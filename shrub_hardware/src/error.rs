use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("gpio error: {0}")]
    Gpio(String),
    #[error("i2c error: {0}")]
    I2c(String),
    #[error("wait timeout")]
    Timeout,
    #[error("sonar echo timeout")]
    EchoTimeout,
    #[error("1-wire device not found: {0}")]
    NoDevice(String),
    #[error("bad sensor data: {0}")]
    Parse(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
