// src/datastore.rs
// Configuration datastores addressed by edit, copy, lock and validate operations.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::xml::Element;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Datastore {
    Candidate,
    Running,
    Startup,
    Url(String),
}

impl Datastore {
    /// Name used as the lock-tracker key and in diagnostics.
    pub fn name(&self) -> String {
        match self {
            Datastore::Candidate => "candidate".to_string(),
            Datastore::Running => "running".to_string(),
            Datastore::Startup => "startup".to_string(),
            Datastore::Url(url) => format!("url:{}", url),
        }
    }

    /// The datastore selector as it appears inside `<target>` or `<source>`.
    pub fn to_element(&self) -> Element {
        match self {
            Datastore::Candidate => Element::new("candidate"),
            Datastore::Running => Element::new("running"),
            Datastore::Startup => Element::new("startup"),
            Datastore::Url(url) => Element::new("url").with_text(url.clone()),
        }
    }

    /// Wraps the selector in a `<target>`/`<source>` container.
    pub fn wrapped(&self, container: &str) -> Element {
        Element::new(container).with_child(self.to_element())
    }

    pub fn is_url(&self) -> bool {
        matches!(self, Datastore::Url(_))
    }
}

impl fmt::Display for Datastore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl FromStr for Datastore {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "candidate" => Ok(Datastore::Candidate),
            "running" => Ok(Datastore::Running),
            "startup" => Ok(Datastore::Startup),
            other => match other.strip_prefix("url:") {
                Some(url) if !url.is_empty() => Ok(Datastore::Url(url.to_string())),
                _ => Err(format!(
                    "unknown datastore '{}' (expected candidate, running, startup or url:<location>)",
                    other
                )),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_names_and_urls() {
        assert_eq!("candidate".parse::<Datastore>(), Ok(Datastore::Candidate));
        assert_eq!(
            "url:http://test".parse::<Datastore>(),
            Ok(Datastore::Url("http://test".to_string()))
        );
        assert!("url:".parse::<Datastore>().is_err());
        assert!("scratch".parse::<Datastore>().is_err());
    }

    #[test]
    fn renders_selectors() {
        assert_eq!(
            Datastore::Candidate.wrapped("target").to_xml(),
            "<target><candidate/></target>"
        );
        assert_eq!(
            Datastore::Url("file:///a&b".into()).to_element().to_xml(),
            "<url>file:///a&amp;b</url>"
        );
    }
}
