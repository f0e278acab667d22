use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Compute device the neural providers run on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Device {
    #[default]
    Cpu,
    Cuda,
    /// Apple Metal Performance Shaders.
    Mps,
}

impl Device {
    pub fn as_str(self) -> &'static str {
        match self {
            Device::Cpu => "cpu",
            Device::Cuda => "cuda",
            Device::Mps => "mps",
        }
    }

    pub fn is_gpu(self) -> bool {
        !matches!(self, Device::Cpu)
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Device {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cpu" => Ok(Device::Cpu),
            "cuda" => Ok(Device::Cuda),
            "mps" => Ok(Device::Mps),
            other => Err(format!("unknown device \"{other}\"")),
        }
    }
}

/// Provider and model-loading configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// External super-resolution executable; restoration is disabled when unset.
    pub restoration_binary: Option<PathBuf>,
    /// Model name passed to the executable with `-n`.
    pub restoration_model: String,
    /// Model directory passed with `-m`, when set.
    pub restoration_models_dir: Option<PathBuf>,
    pub device: Device,
    /// Start loading models as soon as the server boots.
    pub load_on_startup: bool,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            restoration_binary: None,
            restoration_model: "realesrgan-x4plus".into(),
            restoration_models_dir: None,
            device: Device::Cpu,
            load_on_startup: true,
        }
    }
}

impl ProviderConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                  | Default             |
    /// |--------------------------|---------------------|
    /// | `RESTORATION_BINARY`     | unset               |
    /// | `RESTORATION_MODEL`      | `realesrgan-x4plus` |
    /// | `RESTORATION_MODELS_DIR` | unset               |
    /// | `UPSCALER_DEVICE`        | `cpu`               |
    /// | `LOAD_MODELS_ON_STARTUP` | `true`              |
    pub fn from_env() -> Self {
        let restoration_binary = non_empty_var("RESTORATION_BINARY").map(PathBuf::from);

        let restoration_model =
            non_empty_var("RESTORATION_MODEL").unwrap_or_else(|| "realesrgan-x4plus".into());

        let restoration_models_dir = non_empty_var("RESTORATION_MODELS_DIR").map(PathBuf::from);

        let device: Device = std::env::var("UPSCALER_DEVICE")
            .unwrap_or_else(|_| "cpu".into())
            .parse()
            .expect("UPSCALER_DEVICE must be one of cpu, cuda, mps");

        let load_on_startup: bool = std::env::var("LOAD_MODELS_ON_STARTUP")
            .unwrap_or_else(|_| "true".into())
            .parse()
            .expect("LOAD_MODELS_ON_STARTUP must be true or false");

        Self {
            restoration_binary,
            restoration_model,
            restoration_models_dir,
            device,
            load_on_startup,
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
