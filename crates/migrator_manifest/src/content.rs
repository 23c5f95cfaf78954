//! Storage-independent identity of content items.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Separator used when rendering or parsing a location as a path.
pub const PATH_SEPARATOR: &str = "/";

/// Hierarchical, renameable address of a content item (e.g. project/workbook).
///
/// Two locations are equal iff their segment sequences are equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentLocation {
    segments: Vec<String>,
}

impl ContentLocation {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse a `/`-separated path. Empty segments are dropped.
    pub fn from_path(path: &str) -> Self {
        Self::new(path.split(PATH_SEPARATOR).filter(|s| !s.is_empty()))
    }

    /// Location of a user, addressed by domain then username.
    pub fn for_username(domain: &str, username: &str) -> Self {
        Self::new([domain, username])
    }

    pub fn path_segments(&self) -> &[String] {
        &self.segments
    }

    /// Last segment, or "" for the empty location.
    pub fn name(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or("")
    }

    pub fn parent(&self) -> Self {
        let len = self.segments.len().saturating_sub(1);
        Self {
            segments: self.segments[..len].to_vec(),
        }
    }

    pub fn append(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self { segments }
    }

    /// Same parent, different last segment.
    pub fn rename(&self, name: impl Into<String>) -> Self {
        self.parent().append(name)
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn path(&self) -> String {
        self.segments.join(PATH_SEPARATOR)
    }
}

impl fmt::Display for ContentLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path())
    }
}

/// Immutable identity of a content item on one endpoint.
///
/// `id` may be nil for items that have no stable identifier yet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentReference {
    id: Uuid,
    location: ContentLocation,
    #[serde(default)]
    content_url: Option<String>,
    name: String,
}

impl ContentReference {
    /// Build a reference whose name is the location's last segment.
    pub fn new(id: Uuid, location: ContentLocation) -> Self {
        let name = location.name().to_string();
        Self {
            id,
            location,
            content_url: None,
            name,
        }
    }

    /// Empty urls are normalized to `None`.
    pub fn with_content_url(mut self, content_url: impl Into<String>) -> Self {
        let url = content_url.into();
        self.content_url = if url.is_empty() { None } else { Some(url) };
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn has_id(&self) -> bool {
        !self.id.is_nil()
    }

    pub fn location(&self) -> &ContentLocation {
        &self.location
    }

    pub fn content_url(&self) -> Option<&str> {
        self.content_url.as_deref().filter(|url| !url.is_empty())
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for ContentReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.location, self.id)
    }
}

/// Anything the manifest can track: it must be able to describe itself as a reference.
pub trait ContentItem {
    fn to_reference(&self) -> ContentReference;
}

impl ContentItem for ContentReference {
    fn to_reference(&self) -> ContentReference {
        self.clone()
    }
}

impl<T: ContentItem + ?Sized> ContentItem for std::sync::Arc<T> {
    fn to_reference(&self) -> ContentReference {
        (**self).to_reference()
    }
}

/// Kind of migratable content. Each kind gets its own manifest partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ContentType {
    User,
    Group,
    Project,
    DataSource,
    Workbook,
    View,
    CustomView,
    Flow,
    Subscription,
    ExtractRefreshTask,
}

impl ContentType {
    pub const ALL: [ContentType; 10] = [
        ContentType::User,
        ContentType::Group,
        ContentType::Project,
        ContentType::DataSource,
        ContentType::Workbook,
        ContentType::View,
        ContentType::CustomView,
        ContentType::Flow,
        ContentType::Subscription,
        ContentType::ExtractRefreshTask,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::User => "User",
            ContentType::Group => "Group",
            ContentType::Project => "Project",
            ContentType::DataSource => "DataSource",
            ContentType::Workbook => "Workbook",
            ContentType::View => "View",
            ContentType::CustomView => "CustomView",
            ContentType::Flow => "Flow",
            ContentType::Subscription => "Subscription",
            ContentType::ExtractRefreshTask => "ExtractRefreshTask",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ContentType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Invalid content type: '{}'", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_from_path_drops_empty_segments() {
        let loc = ContentLocation::from_path("/Finance//Quarterly/");
        assert_eq!(loc.path_segments(), &["Finance", "Quarterly"]);
        assert_eq!(loc.name(), "Quarterly");
        assert_eq!(loc.to_string(), "Finance/Quarterly");
    }

    #[test]
    fn test_location_equality_is_by_segments() {
        let a = ContentLocation::new(["a/b", "c"]);
        let b = ContentLocation::from_path("a/b/c");
        assert_ne!(a, b);
        assert_eq!(a.path(), b.path());
    }

    #[test]
    fn test_parent_append_rename() {
        let loc = ContentLocation::from_path("Sales/Emea/Pipeline");
        assert_eq!(loc.parent(), ContentLocation::from_path("Sales/Emea"));
        assert_eq!(loc.rename("Forecast"), ContentLocation::from_path("Sales/Emea/Forecast"));
        assert_eq!(ContentLocation::default().parent(), ContentLocation::default());
        assert_eq!(ContentLocation::default().name(), "");
    }

    #[test]
    fn test_reference_defaults_name_and_normalizes_url() {
        let r = ContentReference::new(Uuid::new_v4(), ContentLocation::from_path("p/wb"))
            .with_content_url("");
        assert_eq!(r.name(), "wb");
        assert_eq!(r.content_url(), None);
        assert!(r.has_id());
        assert!(!ContentReference::new(Uuid::nil(), ContentLocation::default()).has_id());
    }

    #[test]
    fn test_content_type_parse() {
        assert_eq!("datasource".parse::<ContentType>().unwrap(), ContentType::DataSource);
        assert!("Metric".parse::<ContentType>().is_err());
    }
}
