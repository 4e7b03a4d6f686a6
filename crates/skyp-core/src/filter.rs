use crate::records::Message;
use crate::CoreError;
use chrono::NaiveDate;
use std::collections::BTreeSet;

/// Client-side filter over an already retrieved message window.
///
/// Each dimension is independent; an unset dimension never excludes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageFilter {
    participants: Option<BTreeSet<String>>,
    date_from: Option<NaiveDate>,
    date_to: Option<NaiveDate>,
    text: Option<String>,
}

impl MessageFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts to messages authored by one of the given identities.
    /// An empty set clears the constraint.
    pub fn with_participants<I, S>(mut self, identities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let identities: BTreeSet<String> = identities.into_iter().map(Into::into).collect();
        self.participants = if identities.is_empty() {
            None
        } else {
            Some(identities)
        };
        self
    }

    /// Inclusive date range; either end may be open.
    pub fn with_date_range(
        mut self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Self, CoreError> {
        if let (Some(from), Some(to)) = (from, to) {
            if from > to {
                return Err(CoreError::InvalidDateRange { from, to });
            }
        }
        self.date_from = from;
        self.date_to = to;
        Ok(self)
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        self.text = if text.is_empty() {
            None
        } else {
            Some(text.to_lowercase())
        };
        self
    }

    pub fn date_from(&self) -> Option<NaiveDate> {
        self.date_from
    }

    pub fn date_to(&self) -> Option<NaiveDate> {
        self.date_to
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_none()
            && self.date_from.is_none()
            && self.date_to.is_none()
            && self.text.is_none()
    }

    pub fn matches(&self, message: &Message) -> bool {
        if let Some(participants) = &self.participants {
            if !participants.contains(message.author()) {
                return false;
            }
        }
        if self.date_from.is_some() || self.date_to.is_some() {
            let Some(date) = message.datetime.map(|datetime| datetime.date_naive()) else {
                return false;
            };
            if self.date_from.is_some_and(|from| date < from) {
                return false;
            }
            if self.date_to.is_some_and(|to| date > to) {
                return false;
            }
        }
        if let Some(text) = &self.text {
            if !message.body().to_lowercase().contains(text.as_str()) {
                return false;
            }
        }
        true
    }

    pub fn apply<'a, I>(&self, messages: I) -> Vec<&'a Message>
    where
        I: IntoIterator<Item = &'a Message>,
    {
        messages
            .into_iter()
            .filter(|message| self.matches(message))
            .collect()
    }
}
