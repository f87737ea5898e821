use std::collections::BTreeMap;

use crate::service::{AppError, AppResult, MetadataConfig};

#[derive(Debug, Clone)]
pub struct Broker {
    pub id: i32,
    pub host: String,
    pub port: u16,
    pub in_service: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct PartitionMeta {
    pub id: i32,
    /// Index into `Metadata::brokers` of the partition leader.
    pub broker_index: usize,
}

/// Immutable broker/topic/partition topology snapshot. The dispatcher is
/// built against one snapshot and restarted to pick up a new one; nothing
/// here changes while connectors are running.
#[derive(Debug, Clone)]
pub struct Metadata {
    brokers: Vec<Broker>,
    topics: BTreeMap<String, Vec<PartitionMeta>>,
}

impl Metadata {
    pub fn new(brokers: Vec<Broker>, topics: BTreeMap<String, Vec<PartitionMeta>>) -> Metadata {
        Metadata { brokers, topics }
    }

    /// Builds a snapshot from static configuration, assigning partition
    /// leaders round-robin across the configured brokers.
    pub fn from_config(config: &MetadataConfig) -> AppResult<Metadata> {
        if config.brokers.is_empty() {
            return Err(AppError::InvalidValue(
                "metadata requires at least one broker".to_string(),
            ));
        }
        let brokers: Vec<Broker> = config
            .brokers
            .iter()
            .map(|b| Broker {
                id: b.id,
                host: b.host.clone(),
                port: b.port,
                in_service: true,
            })
            .collect();
        let mut topics = BTreeMap::new();
        for topic in &config.topics {
            if topic.partitions <= 0 {
                return Err(AppError::InvalidValue(format!(
                    "topic {} must have at least one partition",
                    topic.name
                )));
            }
            let partitions = (0..topic.partitions)
                .map(|id| PartitionMeta {
                    id,
                    broker_index: id as usize % brokers.len(),
                })
                .collect();
            topics.insert(topic.name.clone(), partitions);
        }
        Ok(Metadata { brokers, topics })
    }

    pub fn brokers(&self) -> &[Broker] {
        &self.brokers
    }

    pub fn broker(&self, index: usize) -> Option<&Broker> {
        self.brokers.get(index)
    }

    pub fn topics(&self) -> &BTreeMap<String, Vec<PartitionMeta>> {
        &self.topics
    }

    pub fn has_topic(&self, topic: &str) -> bool {
        self.topics.contains_key(topic)
    }

    /// Leader broker index for a topic partition, if known.
    pub fn broker_index_for(&self, topic: &str, partition: i32) -> Option<usize> {
        self.topics
            .get(topic)?
            .iter()
            .find(|p| p.id == partition)
            .map(|p| p.broker_index)
    }
}

#[cfg(test)]
mod tests {
    use crate::service::{BrokerEntry, TopicEntry};

    use super::*;

    #[test]
    fn partitions_are_assigned_round_robin() {
        let config = MetadataConfig {
            brokers: vec![
                BrokerEntry {
                    id: 7,
                    host: "a".to_string(),
                    port: 9092,
                },
                BrokerEntry {
                    id: 8,
                    host: "b".to_string(),
                    port: 9092,
                },
            ],
            topics: vec![TopicEntry {
                name: "t".to_string(),
                partitions: 3,
            }],
        };
        let metadata = Metadata::from_config(&config).unwrap();
        assert_eq!(metadata.brokers().len(), 2);
        assert_eq!(metadata.broker_index_for("t", 0), Some(0));
        assert_eq!(metadata.broker_index_for("t", 1), Some(1));
        assert_eq!(metadata.broker_index_for("t", 2), Some(0));
        assert_eq!(metadata.broker_index_for("t", 3), None);
        assert_eq!(metadata.broker_index_for("u", 0), None);
    }
}
