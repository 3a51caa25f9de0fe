//! Observed-item types shared by the polling features.

use crate::normalize::normalize_identity;

#[derive(Debug, Clone, PartialEq, Eq)]
/// One show scraped from the tour page.
pub struct ShowDate {
    /// Display-form date, e.g. `06 June 2025`, or a `start - end` range.
    pub date: String,
    pub venue: String,
    /// `Locality, Country` when both are known.
    pub location: String,
    pub url: Option<String>,
    pub image_url: Option<String>,
}

impl ShowDate {
    /// Identity key: normalized date + venue, so minor text differences on
    /// the source page do not create duplicate threads.
    pub fn identity(&self) -> String {
        format!(
            "{}|{}",
            normalize_identity(&self.date),
            normalize_identity(&self.venue)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// One post from the monitored Instagram profile.
pub struct InstagramPost {
    pub post_id: String,
    pub caption: String,
    pub image_url: Option<String>,
    pub taken_at_unix: i64,
}

impl InstagramPost {
    pub fn identity(&self) -> String {
        self.post_id.clone()
    }

    pub fn post_url(&self) -> String {
        format!("https://www.instagram.com/p/{}/", self.post_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Tagged union over everything the pollers can observe.
pub enum ObservedItem {
    Show(ShowDate),
    Instagram(InstagramPost),
}

impl ObservedItem {
    /// Uniform identity extraction across variants.
    pub fn identity(&self) -> String {
        match self {
            Self::Show(show) => show.identity(),
            Self::Instagram(post) => post.identity(),
        }
    }
}
