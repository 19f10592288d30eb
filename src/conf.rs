use std::error;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use url::Url;

const DEFAULT_START_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_CLOSE_AFTER: Duration = Duration::from_secs(10);

/// Configuration errors reported when a path configuration is checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfError {
    InvalidSource(String),
    InvalidName(String),
    RedirectTargetMissing,
    RedirectTargetUnexpected,
    OnDemandRequiresExternalSource,
}

impl fmt::Display for ConfError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfError::InvalidSource(source) => {
                write!(f, "'{}' is not a valid source", source)
            }
            ConfError::InvalidName(name) => write!(f, "'{}' is not a valid path name", name),
            ConfError::RedirectTargetMissing => {
                write!(f, "source is 'redirect' but no redirect target is set")
            }
            ConfError::RedirectTargetUnexpected => {
                write!(f, "a redirect target is set but source is not 'redirect'")
            }
            ConfError::OnDemandRequiresExternalSource => {
                write!(f, "source on demand requires an rtsp:// or rtmp:// source")
            }
        }
    }
}

impl error::Error for ConfError {}

/// Where a path's stream comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// A connected client publishes via announce and record.
    Record,
    /// Pulled from an upstream RTSP server.
    Rtsp(Url),
    /// Pulled from an upstream RTMP server.
    Rtmp(Url),
    /// Describers are redirected to another server.
    Redirect,
}

impl Source {
    /// Whether the stream is fetched by an external puller.
    pub fn is_external(&self) -> bool {
        matches!(self, Source::Rtsp(_) | Source::Rtmp(_))
    }

    /// The upstream URL for external sources.
    pub fn url(&self) -> Option<&Url> {
        match self {
            Source::Rtsp(url) | Source::Rtmp(url) => Some(url),
            _ => None,
        }
    }
}

impl Default for Source {
    fn default() -> Source {
        Source::Record
    }
}

impl FromStr for Source {
    type Err = ConfError;

    fn from_str(s: &str) -> Result<Source, ConfError> {
        match s {
            "record" => Ok(Source::Record),
            "redirect" => Ok(Source::Redirect),
            s if s.starts_with("rtsp://") => Url::parse(s)
                .map(Source::Rtsp)
                .map_err(|_| ConfError::InvalidSource(s.into())),
            s if s.starts_with("rtmp://") => Url::parse(s)
                .map(Source::Rtmp)
                .map_err(|_| ConfError::InvalidSource(s.into())),
            s => Err(ConfError::InvalidSource(s.into())),
        }
    }
}

impl<'de> Deserialize<'de> for Source {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Source, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Transport used by the external RTSP puller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceProtocol {
    Udp,
    Tcp,
}

impl Default for SourceProtocol {
    fn default() -> SourceProtocol {
        SourceProtocol::Udp
    }
}

/// Immutable per-path configuration.
///
/// Snapshotted when the path is created; the path never observes later
/// edits.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathConf {
    pub source: Source,
    pub source_protocol: SourceProtocol,

    /// Start the external puller on the first describe instead of at path
    /// creation, and stop it again when the path has been idle for
    /// `source_on_demand_close_after`.
    pub source_on_demand: bool,
    pub source_on_demand_start_timeout: Duration,
    pub source_on_demand_close_after: Duration,

    /// Where describers are sent when `source` is `Redirect`.
    pub source_redirect: Option<Url>,

    /// Helper command kept running for the whole life of the path.
    pub run_on_init: Option<String>,
    pub run_on_init_restart: bool,

    /// Helper command started on the first describe and stopped after the
    /// path has been idle for `run_on_demand_close_after`.
    pub run_on_demand: Option<String>,
    pub run_on_demand_restart: bool,
    pub run_on_demand_start_timeout: Duration,
    pub run_on_demand_close_after: Duration,

    /// Set iff the path was spawned because its name matched a pattern.
    /// Such paths remove themselves once they have no clients and no
    /// source.
    #[serde(skip)]
    pub regexp: Option<Regex>,
}

impl Default for PathConf {
    fn default() -> PathConf {
        PathConf {
            source: Source::default(),
            source_protocol: SourceProtocol::default(),
            source_on_demand: false,
            source_on_demand_start_timeout: DEFAULT_START_TIMEOUT,
            source_on_demand_close_after: DEFAULT_CLOSE_AFTER,
            source_redirect: None,
            run_on_init: None,
            run_on_init_restart: false,
            run_on_demand: None,
            run_on_demand_restart: false,
            run_on_demand_start_timeout: DEFAULT_START_TIMEOUT,
            run_on_demand_close_after: DEFAULT_CLOSE_AFTER,
            regexp: None,
        }
    }
}

impl PathConf {
    /// Validate the configuration for a path of the given name.
    pub fn check(&self, name: &str) -> Result<(), ConfError> {
        check_path_name(name)?;

        match self.source {
            Source::Redirect => {
                if self.source_redirect.is_none() {
                    return Err(ConfError::RedirectTargetMissing);
                }
            }
            _ => {
                if self.source_redirect.is_some() {
                    return Err(ConfError::RedirectTargetUnexpected);
                }
            }
        }

        if self.source_on_demand && !self.source.is_external() {
            return Err(ConfError::OnDemandRequiresExternalSource);
        }

        Ok(())
    }
}

static PATH_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9a-zA-Z_\-/\.~]+$").expect("static regex"));

/// Validate a runtime path name.
pub fn check_path_name(name: &str) -> Result<(), ConfError> {
    if name.is_empty() || name.starts_with('/') || !PATH_NAME_RE.is_match(name) {
        return Err(ConfError::InvalidName(name.into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_parsing() {
        assert_eq!("record".parse::<Source>().unwrap(), Source::Record);
        assert_eq!("redirect".parse::<Source>().unwrap(), Source::Redirect);

        match "rtsp://example.com/stream".parse::<Source>().unwrap() {
            Source::Rtsp(url) => assert_eq!(url.host_str(), Some("example.com")),
            other => panic!("unexpected source {:?}", other),
        }

        assert!("rtmp://example.com/stream".parse::<Source>().unwrap().is_external());
        assert!("file:///tmp/x".parse::<Source>().is_err());
        assert!("".parse::<Source>().is_err());
    }

    #[test]
    fn deserializes_with_defaults() {
        let conf: PathConf = serde_json::from_str("{}").unwrap();
        assert_eq!(conf.source, Source::Record);
        assert_eq!(conf.source_protocol, SourceProtocol::Udp);
        assert!(!conf.source_on_demand);
        assert_eq!(conf.source_on_demand_start_timeout, Duration::from_secs(10));

        let conf: PathConf = serde_json::from_str(
            r#"{
                "source": "rtsp://example.com/s",
                "source_protocol": "tcp",
                "source_on_demand": true,
                "source_on_demand_start_timeout": {"secs": 2, "nanos": 0}
            }"#,
        )
        .unwrap();
        assert!(conf.source.is_external());
        assert_eq!(conf.source_protocol, SourceProtocol::Tcp);
        assert_eq!(conf.source_on_demand_start_timeout, Duration::from_secs(2));
    }

    #[test]
    fn check_rejects_inconsistent_sources() {
        let mut conf = PathConf::default();
        conf.source = Source::Redirect;
        assert_eq!(conf.check("cam1"), Err(ConfError::RedirectTargetMissing));

        conf.source_redirect = Some(Url::parse("rtsp://other/s").unwrap());
        assert_eq!(conf.check("cam1"), Ok(()));

        conf.source = Source::Record;
        assert_eq!(conf.check("cam1"), Err(ConfError::RedirectTargetUnexpected));

        let mut conf = PathConf::default();
        conf.source_on_demand = true;
        assert_eq!(
            conf.check("cam1"),
            Err(ConfError::OnDemandRequiresExternalSource)
        );

        conf.source = "rtsp://example.com/s".parse().unwrap();
        assert_eq!(conf.check("cam1"), Ok(()));
    }

    #[test]
    fn path_names() {
        assert!(check_path_name("cam1").is_ok());
        assert!(check_path_name("a/b/c.d~e-f_g").is_ok());
        assert!(check_path_name("").is_err());
        assert!(check_path_name("/leading").is_err());
        assert!(check_path_name("white space").is_err());
    }
}
