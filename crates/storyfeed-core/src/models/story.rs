use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Story {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "photoUrl", default)]
    pub photo_url: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "lat", default)]
    pub latitude: Option<f64>,
    #[serde(rename = "lon", default)]
    pub longitude: Option<f64>,
}

impl Story {
    /// Equality over the fields a reader actually sees.
    ///
    /// Weaker than `==`: a story whose timestamp or coordinates moved but whose
    /// name, description and photo are unchanged does not need re-rendering.
    pub fn content_eq(&self, other: &Story) -> bool {
        self.name == other.name
            && self.description == other.description
            && self.photo_url == other.photo_url
    }

    /// Both coordinates, if the story was posted with a location
    pub fn location(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        }
    }

    pub fn formatted_date(&self) -> String {
        self.created_at.format("%b %d, %Y").to_string()
    }
}

/// Envelope returned by `GET /stories`.
#[derive(Debug, Clone, Deserialize)]
pub struct StoriesResponse {
    #[serde(default)]
    pub error: bool,
    #[serde(default)]
    pub message: String,
    #[serde(rename = "listStory", alias = "items", default)]
    pub stories: Vec<Story>,
}

/// Envelope returned by endpoints that carry no payload, e.g. `POST /stories`.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusResponse {
    #[serde(default)]
    pub error: bool,
    #[serde(default)]
    pub message: String,
}

/// A story to upload. The photo is sent as-is; no resizing happens here.
#[derive(Debug, Clone)]
pub struct NewStory {
    pub description: String,
    pub photo: Vec<u8>,
    pub file_name: String,
    pub location: Option<(f64, f64)>,
}

impl NewStory {
    pub(crate) fn photo_mime(&self) -> &'static str {
        let lower = self.file_name.to_ascii_lowercase();
        if lower.ends_with(".png") {
            "image/png"
        } else if lower.ends_with(".webp") {
            "image/webp"
        } else {
            "image/jpeg"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn story(id: &str, description: &str) -> Story {
        Story {
            id: id.to_string(),
            name: "Dimas".to_string(),
            description: description.to_string(),
            photo_url: "https://example.com/a.jpg".to_string(),
            created_at: Utc::now(),
            latitude: None,
            longitude: None,
        }
    }

    #[test]
    fn test_content_eq_ignores_timestamp_and_location() {
        let a = story("story-1", "hello");
        let mut b = a.clone();
        b.created_at = a.created_at - chrono::Duration::hours(3);
        b.latitude = Some(-6.2);
        b.longitude = Some(106.8);

        assert!(a.content_eq(&b));
        assert_ne!(a, b);
    }

    #[test]
    fn test_content_eq_detects_description_change() {
        let a = story("story-1", "hello");
        let b = story("story-1", "hello, edited");
        assert!(!a.content_eq(&b));
    }

    #[test]
    fn test_parse_stories_response() {
        let json = r#"{"error":false,"message":"Stories fetched successfully","listStory":[{"id":"story-FvU4u0Vp2S3PMsFg","name":"Dimas","description":"Lorem Ipsum","photoUrl":"https://story-api.dicoding.dev/images/stories/photos-1641623658595_dummy-pic.png","createdAt":"2022-01-08T06:34:18.598Z","lat":-10.212,"lon":-16.002}]}"#;

        let resp: StoriesResponse =
            serde_json::from_str(json).expect("Failed to parse stories test JSON");
        assert!(!resp.error);
        assert_eq!(resp.stories.len(), 1);

        let s = &resp.stories[0];
        assert_eq!(s.id, "story-FvU4u0Vp2S3PMsFg");
        assert_eq!(s.location(), Some((-10.212, -16.002)));
        assert_eq!(s.formatted_date(), "Jan 08, 2022");
    }

    #[test]
    fn test_parse_items_alias_and_missing_location() {
        let json = r#"{"items":[{"id":"a","name":"n","description":"d","photoUrl":"p","createdAt":"2022-01-08T06:34:18Z","lat":null,"lon":null}]}"#;

        let resp: StoriesResponse = serde_json::from_str(json).expect("Failed to parse items alias");
        assert_eq!(resp.stories.len(), 1);
        assert_eq!(resp.stories[0].location(), None);
    }

    #[test]
    fn test_photo_mime_from_file_name() {
        let mut story = NewStory {
            description: "d".to_string(),
            photo: Vec::new(),
            file_name: "beach.PNG".to_string(),
            location: None,
        };
        assert_eq!(story.photo_mime(), "image/png");

        story.file_name = "beach.webp".to_string();
        assert_eq!(story.photo_mime(), "image/webp");

        story.file_name = "beach".to_string();
        assert_eq!(story.photo_mime(), "image/jpeg");
    }
}
