use crate::config::ConfigError;
use crate::credit_integration::CreditIntegrationError;
use crate::forms::FormError;
use crate::http::ApiError;
use crate::leasing::invoice::InvoiceError;
use crate::leasing::report::ReportError;
use crate::leasing::LeasingError;
use crate::plotsearch::PlotSearchError;
use crate::store::RepositoryError;
use crate::telemetry::TelemetryError;
use std::fmt;

/// Startup and process-level failures; request errors use [`crate::http::ApiError`].
#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
    Server(axum::Error),
    CreditBureau(CreditIntegrationError),
    Store(RepositoryError),
    Data(serde_json::Error),
    /// A domain operation run from the command line failed.
    Domain(ApiError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Server(err) => write!(f, "server error: {}", err),
            AppError::CreditBureau(err) => write!(f, "credit bureau setup failed: {}", err),
            AppError::Store(err) => write!(f, "store error: {}", err),
            AppError::Data(err) => write!(f, "invalid data: {}", err),
            AppError::Domain(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::Server(err) => Some(err),
            AppError::CreditBureau(err) => Some(err),
            AppError::Store(err) => Some(err),
            AppError::Data(err) => Some(err),
            AppError::Domain(err) => Some(err),
        }
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<TelemetryError> for AppError {
    fn from(value: TelemetryError) -> Self {
        Self::Telemetry(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<axum::Error> for AppError {
    fn from(value: axum::Error) -> Self {
        Self::Server(value)
    }
}

impl From<CreditIntegrationError> for AppError {
    fn from(value: CreditIntegrationError) -> Self {
        Self::CreditBureau(value)
    }
}

impl From<RepositoryError> for AppError {
    fn from(value: RepositoryError) -> Self {
        Self::Store(value)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        Self::Data(value)
    }
}

impl From<ApiError> for AppError {
    fn from(value: ApiError) -> Self {
        Self::Domain(value)
    }
}

macro_rules! domain_error {
    ($($error:ty),+) => {
        $(
            impl From<$error> for AppError {
                fn from(value: $error) -> Self {
                    Self::Domain(value.into())
                }
            }
        )+
    };
}

domain_error!(LeasingError, InvoiceError, ReportError, FormError, PlotSearchError);
