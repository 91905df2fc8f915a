//! Container image reference types based on [reference.go](https://github.com/distribution/distribution/blob/v2.7.1/reference/reference.go):
//!
//! ```go
//! // reference                       := name [ ":" tag ]
//! // name                            := [domain '/'] path-component ['/' path-component]*
//! // domain                          := domain-component ['.' domain-component]* [':' port-number]
//! // domain-component                := /([a-zA-Z0-9]|[a-zA-Z0-9][a-zA-Z0-9-]*[a-zA-Z0-9])/
//! // port-number                     := /[0-9]+/
//! // path-component                  := alpha-numeric [separator alpha-numeric]*
//! // alpha-numeric                   := /[a-z0-9]+/
//! // separator                       := /[_.]|__|[-]*/
//! //
//! // tag                             := /[\w][\w.-]{0,127}/
//! ```
//!
//! Digests are intentionally unsupported, every reference this crate produces is built or pushed
//! by tag.

use std::{fmt, str::FromStr, sync::LazyLock};

use regex::Regex;

#[cfg(feature = "serde")]
use ::serde::{Deserialize, Deserializer, Serialize, Serializer};

const DOMAIN_COMPONENT: &str = "(?:[a-zA-Z0-9]|[a-zA-Z0-9][a-zA-Z0-9-]*[a-zA-Z0-9])";
const PATH_COMPONENT: &str = "[a-z0-9]+(?:(?:[._]|__|-+)[a-z0-9]+)*";

static NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        "^(?:{DOMAIN_COMPONENT}(?:\\.{DOMAIN_COMPONENT})*(?::[0-9]+)?/)?{PATH_COMPONENT}(?:/{PATH_COMPONENT})*$"
    ))
    .unwrap()
});

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\w[\w.-]{0,127}$").unwrap());

/// The longest total name length accepted by common registries.
const NAME_MAX_LEN: usize = 255;

#[derive(Debug, PartialEq, Eq)]
pub struct InvalidImageName(String);

impl std::error::Error for InvalidImageName {}

impl fmt::Display for InvalidImageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid container image name: {:?}", self.0)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct InvalidTag(String);

impl std::error::Error for InvalidTag {}

impl fmt::Display for InvalidTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid container image tag: {:?}", self.0)
    }
}

/// An image name with an optional registry prefix, without a tag, e.g.
/// `registry.example.com/team/app`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageName(String);

impl ImageName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for ImageName {
    type Err = InvalidImageName;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.len() <= NAME_MAX_LEN && NAME_RE.is_match(value) {
            Ok(Self(value.to_owned()))
        } else {
            Err(InvalidImageName(value.to_owned()))
        }
    }
}

impl fmt::Display for ImageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An image tag, e.g. `latest` or `v1.2.3`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tag(String);

impl Tag {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Tag {
    type Err = InvalidTag;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if TAG_RE.is_match(value) {
            Ok(Self(value.to_owned()))
        } else {
            Err(InvalidTag(value.to_owned()))
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A fully tagged image reference, e.g. `registry.example.com/team/app:v1.2.3`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageRef {
    name: ImageName,
    tag: Tag,
}

impl ImageRef {
    pub fn new(name: ImageName, tag: Tag) -> Self {
        Self { name, tag }
    }

    pub fn name(&self) -> &ImageName {
        &self.name
    }

    pub fn tag(&self) -> &Tag {
        &self.tag
    }

    /// The same tag under a different name, as produced by retagging for a remote repository.
    pub fn with_name(&self, name: ImageName) -> Self {
        Self {
            name,
            tag: self.tag.clone(),
        }
    }
}

impl FromStr for ImageRef {
    type Err = InvalidImageName;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        // A `:` only introduces a tag when it appears after the last `/`, otherwise it separates
        // the registry port, as in `localhost:5000/app`.
        let tag_start = match value.rfind(':') {
            Some(index) if !value[index..].contains('/') => Some(index),
            _ => None,
        };

        match tag_start {
            Some(index) => {
                let name = value[..index].parse()?;
                let tag = value[index + 1..]
                    .parse()
                    .map_err(|_| InvalidImageName(value.to_owned()))?;
                Ok(Self { name, tag })
            }
            None => Ok(Self {
                name: value.parse()?,
                tag: Tag("latest".to_owned()),
            }),
        }
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.tag)
    }
}

#[cfg(feature = "serde")]
macro_rules! string_serde {
    ($type:ty) => {
        impl Serialize for $type {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $type {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let value = String::deserialize(deserializer)?;
                value.parse().map_err(::serde::de::Error::custom)
            }
        }
    };
}

#[cfg(feature = "serde")]
string_serde!(ImageName);
#[cfg(feature = "serde")]
string_serde!(Tag);
#[cfg(feature = "serde")]
string_serde!(ImageRef);
