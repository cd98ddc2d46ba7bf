//! Credential to topic list table, validated once before connecting.

use serde_json::Value;
use snafu::prelude::*;

/// Error when caller supplied subscriptions are not a credential to topic list mapping
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)), module(error), context(suffix(false)))]
pub enum InvalidSubscriptions {
    /// mapping input is not a json object
    #[snafu(display("subscriptions must be a mapping of auth token to topics, got: {json}"))]
    NotMapping {
        /// received json
        json: String,
    },

    /// value of a token is not a list of topic strings
    #[snafu(display("topics of a token must be a list of strings, got: {json}"))]
    TopicsNotList {
        /// received json of the topics value
        json: String,
    },
}

/// Raw subscription input: one auth token, or a whole token to topics mapping.
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionInput {
    /// single auth token, topics are given separately
    Token(String),
    /// json object of auth token to topic list
    Mapping(Value),
}

impl From<&str> for SubscriptionInput {
    fn from(token: &str) -> Self {
        Self::Token(token.to_string())
    }
}

impl From<String> for SubscriptionInput {
    fn from(token: String) -> Self {
        Self::Token(token)
    }
}

impl From<Value> for SubscriptionInput {
    fn from(mapping: Value) -> Self {
        Self::Mapping(mapping)
    }
}

/// One auth token with the topics it listens to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    /// oauth token sent as `auth_token`
    pub token: String,
    /// topics to LISTEN/UNLISTEN
    pub topics: Vec<String>,
}

/// Ordered, immutable subscription table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Subscriptions {
    entries: Vec<Subscription>,
}

impl Subscriptions {
    /// Build the table from a token plus topics, or from a mapping (then `topics` is ignored).
    ///
    /// Mapping validation is all-or-nothing: one bad value rejects the whole input.
    pub fn build<I>(input: I, topics: Vec<String>) -> Result<Self, InvalidSubscriptions>
    where
        I: Into<SubscriptionInput>,
    {
        match input.into() {
            SubscriptionInput::Token(token) => Ok(Self {
                entries: vec![Subscription { token, topics }],
            }),
            SubscriptionInput::Mapping(value) => Self::from_mapping(value),
        }
    }

    fn from_mapping(value: Value) -> Result<Self, InvalidSubscriptions> {
        let obj = value.as_object().with_context(|| error::NotMapping {
            json: value.to_string(),
        })?;

        let entries = obj
            .iter()
            .map(|(token, topics)| {
                let list = topics.as_array().with_context(|| error::TopicsNotList {
                    json: topics.to_string(),
                })?;

                let topics = list
                    .iter()
                    .map(|topic| topic.as_str().map(str::to_string))
                    .collect::<Option<Vec<_>>>()
                    .with_context(|| error::TopicsNotList {
                        json: topics.to_string(),
                    })?;

                Ok(Subscription {
                    token: token.clone(),
                    topics,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { entries })
    }

    /// Build from already typed entries, no validation needed
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = Subscription>,
    {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    /// iterate entries in input order
    pub fn iter(&self) -> impl Iterator<Item = &Subscription> {
        self.entries.iter()
    }

    /// entry count
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// true if there is no entry
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    fn topics(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_build_from_single_token() {
        let subs = Subscriptions::build("foo", topics(&["bar", "baz"])).unwrap();

        assert_eq!(subs.len(), 1);
        let entry = subs.iter().next().unwrap();
        assert_eq!(entry.token, "foo");
        assert_eq!(entry.topics, topics(&["bar", "baz"]));
    }

    #[test]
    fn test_build_from_mapping_keeps_order() {
        let subs = Subscriptions::build(
            json!({
                "foo": ["bar", "baz"],
                "oof": ["rab", "zab"],
            }),
            vec![],
        )
        .unwrap();

        let expected = Subscriptions::from_entries(vec![
            Subscription {
                token: "foo".to_string(),
                topics: topics(&["bar", "baz"]),
            },
            Subscription {
                token: "oof".to_string(),
                topics: topics(&["rab", "zab"]),
            },
        ]);

        assert_eq!(subs, expected);
    }

    #[test]
    fn test_build_rejects_list_input() {
        let err = Subscriptions::build(json!(["foo"]), vec![]).unwrap_err();
        assert!(matches!(err, InvalidSubscriptions::NotMapping { .. }));
    }

    #[test]
    fn test_build_rejects_non_list_topics() {
        let err = Subscriptions::build(json!({"foo": "bar"}), vec![]).unwrap_err();
        assert!(matches!(err, InvalidSubscriptions::TopicsNotList { .. }));
    }

    #[test]
    fn test_build_rejects_whole_mapping_on_one_bad_entry() {
        let result = Subscriptions::build(
            json!({
                "good": ["whispers.1"],
                "bad": {"topics": ["whispers.2"]},
            }),
            vec![],
        );

        assert!(result.is_err());
    }

    #[test]
    fn test_build_rejects_non_string_topic() {
        let result = Subscriptions::build(json!({"foo": ["bar", 1]}), vec![]);
        assert!(result.is_err());
    }
}
