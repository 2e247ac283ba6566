// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Shared message and topic types for the recording pipeline.
//!
//! A topic (a named stream of messages of one type) is registered once with
//! [`TopicMetadata`]; every record flowing through the writer is a
//! [`SerializedMessage`] tagged with the topic name.

use serde::{Deserialize, Serialize};

/// Description of a topic registered with the writer.
///
/// Registered once per topic name before any message on that topic is
/// written. Identical re-registration is idempotent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicMetadata {
    /// Unique topic ID within the bag
    pub id: u16,
    /// Topic name (e.g., "/joint_states", "/tf")
    pub name: String,
    /// Message type name (e.g., "sensor_msgs/msg/JointState")
    pub type_name: String,
    /// Serialization format of stored payloads (e.g., "cdr")
    pub serialization_format: String,
    /// QoS profiles offered by the recorded publisher, as an opaque string
    pub offered_qos_profiles: String,
    /// Hash of the type description (empty if unknown)
    pub type_description_hash: String,
}

impl TopicMetadata {
    /// Create a new TopicMetadata.
    pub fn new(id: u16, name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            type_name: type_name.into(),
            serialization_format: String::new(),
            offered_qos_profiles: String::new(),
            type_description_hash: String::new(),
        }
    }

    /// Set the serialization format.
    pub fn with_serialization_format(mut self, format: impl Into<String>) -> Self {
        self.serialization_format = format.into();
        self
    }

    /// Set the offered QoS profiles.
    pub fn with_offered_qos_profiles(mut self, profiles: impl Into<String>) -> Self {
        self.offered_qos_profiles = profiles.into();
        self
    }

    /// Set the type description hash.
    pub fn with_type_description_hash(mut self, hash: impl Into<String>) -> Self {
        self.type_description_hash = hash.into();
        self
    }
}

/// A topic together with the number of messages recorded on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicInformation {
    /// The registered topic description
    pub topic_metadata: TopicMetadata,
    /// Messages recorded on this topic so far
    pub message_count: u64,
}

impl TopicInformation {
    /// Create a new TopicInformation with a zero count.
    pub fn new(topic_metadata: TopicMetadata) -> Self {
        Self {
            topic_metadata,
            message_count: 0,
        }
    }
}

/// A pre-serialized record flowing through the write pipeline.
///
/// Immutable once constructed; the pipeline shares it with the caller via
/// `Arc`, so a cached or snapshotted message never needs copying.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializedMessage {
    /// Topic this message belongs to
    pub topic_name: String,
    /// Opaque serialized payload
    pub payload: Vec<u8>,
    /// Receive timestamp (nanoseconds); drives all time bookkeeping
    pub recv_timestamp: u64,
    /// Publish timestamp (nanoseconds)
    pub send_timestamp: u64,
}

impl SerializedMessage {
    /// Create a new SerializedMessage.
    pub fn new(topic_name: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            topic_name: topic_name.into(),
            payload,
            recv_timestamp: 0,
            send_timestamp: 0,
        }
    }

    /// Set both timestamps to the same instant.
    pub fn with_timestamp(mut self, nanos: u64) -> Self {
        self.recv_timestamp = nanos;
        self.send_timestamp = nanos;
        self
    }

    /// Set the receive timestamp.
    pub fn with_recv_timestamp(mut self, nanos: u64) -> Self {
        self.recv_timestamp = nanos;
        self
    }

    /// Set the send timestamp.
    pub fn with_send_timestamp(mut self, nanos: u64) -> Self {
        self.send_timestamp = nanos;
        self
    }

    /// Get the payload length in bytes.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Check if the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_metadata_builder() {
        let topic = TopicMetadata::new(3, "/chatter", "std_msgs/msg/String")
            .with_serialization_format("cdr")
            .with_offered_qos_profiles("default")
            .with_type_description_hash("abc123");

        assert_eq!(topic.id, 3);
        assert_eq!(topic.name, "/chatter");
        assert_eq!(topic.type_name, "std_msgs/msg/String");
        assert_eq!(topic.serialization_format, "cdr");
        assert_eq!(topic.offered_qos_profiles, "default");
        assert_eq!(topic.type_description_hash, "abc123");
    }

    #[test]
    fn test_topic_information_starts_at_zero() {
        let info = TopicInformation::new(TopicMetadata::new(0, "/tf", "tf2_msgs/msg/TFMessage"));
        assert_eq!(info.message_count, 0);
        assert_eq!(info.topic_metadata.name, "/tf");
    }

    #[test]
    fn test_serialized_message_builder() {
        let msg = SerializedMessage::new("/chatter", b"hello".to_vec())
            .with_recv_timestamp(1000)
            .with_send_timestamp(900);

        assert_eq!(msg.topic_name, "/chatter");
        assert_eq!(msg.payload, b"hello");
        assert_eq!(msg.recv_timestamp, 1000);
        assert_eq!(msg.send_timestamp, 900);
        assert_eq!(msg.len(), 5);
        assert!(!msg.is_empty());
    }

    #[test]
    fn test_serialized_message_with_timestamp_sets_both() {
        let msg = SerializedMessage::new("/imu", vec![]).with_timestamp(42);
        assert_eq!(msg.recv_timestamp, 42);
        assert_eq!(msg.send_timestamp, 42);
        assert!(msg.is_empty());
    }

    #[test]
    fn test_topic_metadata_serde_round_trip() {
        let topic =
            TopicMetadata::new(7, "/odom", "nav_msgs/msg/Odometry").with_serialization_format("cdr");
        let json = serde_json::to_string(&topic).unwrap();
        let back: TopicMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(back, topic);
    }
}
