//! Request and response layouts of the decoded Kafka APIs.
//!
//! Field names follow the protocol's JSON message definitions in
//! camelCase. APIs or versions missing here are carried as opaque bodies.

use super::api_key::ApiKey;
use super::schema::{field, tagged, Field, FieldType, MessageSchema};

const BOOL: FieldType = FieldType::Bool;
const INT8: FieldType = FieldType::Int8;
const INT16: FieldType = FieldType::Int16;
const INT32: FieldType = FieldType::Int32;
const INT64: FieldType = FieldType::Int64;
const UUID: FieldType = FieldType::Uuid;
const STRING: FieldType = FieldType::String;
const BYTES: FieldType = FieldType::Bytes;
const RECORDS: FieldType = FieldType::Records;
const INT32S: FieldType = FieldType::Array(&FieldType::Int32);
const INT64S: FieldType = FieldType::Array(&FieldType::Int64);
const STRINGS: FieldType = FieldType::Array(&FieldType::String);

macro_rules! array {
    ($fields:expr) => {
        FieldType::Array(&FieldType::Struct($fields))
    };
}

macro_rules! schema {
    ($name:ident, $key:ident, $min:literal..=$max:literal, $fields:expr) => {
        static $name: MessageSchema = MessageSchema {
            api_key: ApiKey::$key,
            min_version: $min,
            max_version: $max,
            fields: $fields,
        };
    };
}

// Produce (0)

const PRODUCE_PARTITION: &[Field] = &[
    field!("index", INT32, 0),
    field!("records", RECORDS, 0),
];
const PRODUCE_TOPIC: &[Field] = &[
    field!("name", STRING, 0),
    field!("partitionData", array!(PRODUCE_PARTITION), 0),
];
schema!(PRODUCE_REQUEST, Produce, 0..=9, &[
    field!("transactionalId", STRING, 3),
    field!("acks", INT16, 0),
    field!("timeoutMs", INT32, 0),
    field!("topicData", array!(PRODUCE_TOPIC), 0),
]);

const PRODUCE_RECORD_ERROR: &[Field] = &[
    field!("batchIndex", INT32, 8),
    field!("batchIndexErrorMessage", STRING, 8),
];
const PRODUCE_PARTITION_RESPONSE: &[Field] = &[
    field!("index", INT32, 0),
    field!("errorCode", INT16, 0),
    field!("baseOffset", INT64, 0),
    field!("logAppendTimeMs", INT64, 2),
    field!("logStartOffset", INT64, 5),
    field!("recordErrors", array!(PRODUCE_RECORD_ERROR), 8),
    field!("errorMessage", STRING, 8),
];
const PRODUCE_TOPIC_RESPONSE: &[Field] = &[
    field!("name", STRING, 0),
    field!("partitionResponses", array!(PRODUCE_PARTITION_RESPONSE), 0),
];
schema!(PRODUCE_RESPONSE, Produce, 0..=9, &[
    field!("responses", array!(PRODUCE_TOPIC_RESPONSE), 0),
    field!("throttleTimeMs", INT32, 1),
]);

// Fetch (1)

const FETCH_PARTITION: &[Field] = &[
    field!("partition", INT32, 0),
    field!("currentLeaderEpoch", INT32, 9),
    field!("fetchOffset", INT64, 0),
    field!("lastFetchedEpoch", INT32, 12),
    field!("logStartOffset", INT64, 5),
    field!("partitionMaxBytes", INT32, 0),
];
const FETCH_TOPIC: &[Field] = &[
    field!("topic", STRING, 0),
    field!("partitions", array!(FETCH_PARTITION), 0),
];
const FETCH_FORGOTTEN_TOPIC: &[Field] = &[
    field!("topic", STRING, 7),
    field!("partitions", INT32S, 7),
];
schema!(FETCH_REQUEST, Fetch, 0..=12, &[
    tagged!("clusterId", STRING, 12, 0),
    field!("replicaId", INT32, 0),
    field!("maxWaitMs", INT32, 0),
    field!("minBytes", INT32, 0),
    field!("maxBytes", INT32, 3),
    field!("isolationLevel", INT8, 4),
    field!("sessionId", INT32, 7),
    field!("sessionEpoch", INT32, 7),
    field!("topics", array!(FETCH_TOPIC), 0),
    field!("forgottenTopicsData", array!(FETCH_FORGOTTEN_TOPIC), 7),
    field!("rackId", STRING, 11),
]);

const FETCH_EPOCH_END_OFFSET: &[Field] = &[
    field!("epoch", INT32, 12),
    field!("endOffset", INT64, 12),
];
const FETCH_LEADER_ID_AND_EPOCH: &[Field] = &[
    field!("leaderId", INT32, 12),
    field!("leaderEpoch", INT32, 12),
];
const FETCH_SNAPSHOT_ID: &[Field] = &[
    field!("endOffset", INT64, 12),
    field!("epoch", INT32, 12),
];
const FETCH_ABORTED_TRANSACTION: &[Field] = &[
    field!("producerId", INT64, 4),
    field!("firstOffset", INT64, 4),
];
const FETCH_PARTITION_DATA: &[Field] = &[
    field!("partitionIndex", INT32, 0),
    field!("errorCode", INT16, 0),
    field!("highWatermark", INT64, 0),
    field!("lastStableOffset", INT64, 4),
    field!("logStartOffset", INT64, 5),
    tagged!("divergingEpoch", FieldType::Struct(FETCH_EPOCH_END_OFFSET), 12, 0),
    tagged!("currentLeader", FieldType::Struct(FETCH_LEADER_ID_AND_EPOCH), 12, 1),
    tagged!("snapshotId", FieldType::Struct(FETCH_SNAPSHOT_ID), 12, 2),
    field!("abortedTransactions", array!(FETCH_ABORTED_TRANSACTION), 4),
    field!("preferredReadReplica", INT32, 11),
    field!("records", RECORDS, 0),
];
const FETCH_TOPIC_RESPONSE: &[Field] = &[
    field!("topic", STRING, 0),
    field!("partitions", array!(FETCH_PARTITION_DATA), 0),
];
schema!(FETCH_RESPONSE, Fetch, 0..=12, &[
    field!("throttleTimeMs", INT32, 1),
    field!("errorCode", INT16, 7),
    field!("sessionId", INT32, 7),
    field!("responses", array!(FETCH_TOPIC_RESPONSE), 0),
]);

// ListOffsets (2)

const LIST_OFFSETS_PARTITION: &[Field] = &[
    field!("partitionIndex", INT32, 0),
    field!("currentLeaderEpoch", INT32, 4),
    field!("timestamp", INT64, 0),
    field!("maxNumOffsets", INT32, 0, 0),
];
const LIST_OFFSETS_TOPIC: &[Field] = &[
    field!("name", STRING, 0),
    field!("partitions", array!(LIST_OFFSETS_PARTITION), 0),
];
schema!(LIST_OFFSETS_REQUEST, ListOffsets, 0..=7, &[
    field!("replicaId", INT32, 0),
    field!("isolationLevel", INT8, 2),
    field!("topics", array!(LIST_OFFSETS_TOPIC), 0),
]);

const LIST_OFFSETS_PARTITION_RESPONSE: &[Field] = &[
    field!("partitionIndex", INT32, 0),
    field!("errorCode", INT16, 0),
    field!("oldStyleOffsets", INT64S, 0, 0),
    field!("timestamp", INT64, 1),
    field!("offset", INT64, 1),
    field!("leaderEpoch", INT32, 4),
];
const LIST_OFFSETS_TOPIC_RESPONSE: &[Field] = &[
    field!("name", STRING, 0),
    field!("partitions", array!(LIST_OFFSETS_PARTITION_RESPONSE), 0),
];
schema!(LIST_OFFSETS_RESPONSE, ListOffsets, 0..=7, &[
    field!("throttleTimeMs", INT32, 2),
    field!("topics", array!(LIST_OFFSETS_TOPIC_RESPONSE), 0),
]);

// Metadata (3)

const METADATA_TOPIC: &[Field] = &[
    field!("topicId", UUID, 10),
    field!("name", STRING, 0),
];
schema!(METADATA_REQUEST, Metadata, 0..=12, &[
    field!("topics", array!(METADATA_TOPIC), 0),
    field!("allowAutoTopicCreation", BOOL, 4),
    field!("includeClusterAuthorizedOperations", BOOL, 8, 10),
    field!("includeTopicAuthorizedOperations", BOOL, 8),
]);

const METADATA_BROKER: &[Field] = &[
    field!("nodeId", INT32, 0),
    field!("host", STRING, 0),
    field!("port", INT32, 0),
    field!("rack", STRING, 1),
];
const METADATA_PARTITION: &[Field] = &[
    field!("errorCode", INT16, 0),
    field!("partitionIndex", INT32, 0),
    field!("leaderId", INT32, 0),
    field!("leaderEpoch", INT32, 7),
    field!("replicaNodes", INT32S, 0),
    field!("isrNodes", INT32S, 0),
    field!("offlineReplicas", INT32S, 5),
];
const METADATA_TOPIC_RESPONSE: &[Field] = &[
    field!("errorCode", INT16, 0),
    field!("name", STRING, 0),
    field!("topicId", UUID, 10),
    field!("isInternal", BOOL, 1),
    field!("partitions", array!(METADATA_PARTITION), 0),
    field!("topicAuthorizedOperations", INT32, 8),
];
schema!(METADATA_RESPONSE, Metadata, 0..=12, &[
    field!("throttleTimeMs", INT32, 3),
    field!("brokers", array!(METADATA_BROKER), 0),
    field!("clusterId", STRING, 2),
    field!("controllerId", INT32, 1),
    field!("topics", array!(METADATA_TOPIC_RESPONSE), 0),
    field!("clusterAuthorizedOperations", INT32, 8, 10),
]);

// OffsetCommit (8)

const OFFSET_COMMIT_PARTITION: &[Field] = &[
    field!("partitionIndex", INT32, 0),
    field!("committedOffset", INT64, 0),
    field!("committedLeaderEpoch", INT32, 6),
    field!("commitTimestamp", INT64, 1, 1),
    field!("committedMetadata", STRING, 0),
];
const OFFSET_COMMIT_TOPIC: &[Field] = &[
    field!("name", STRING, 0),
    field!("partitions", array!(OFFSET_COMMIT_PARTITION), 0),
];
schema!(OFFSET_COMMIT_REQUEST, OffsetCommit, 0..=8, &[
    field!("groupId", STRING, 0),
    field!("generationId", INT32, 1),
    field!("memberId", STRING, 1),
    field!("groupInstanceId", STRING, 7),
    field!("retentionTimeMs", INT64, 2, 4),
    field!("topics", array!(OFFSET_COMMIT_TOPIC), 0),
]);

const OFFSET_COMMIT_PARTITION_RESPONSE: &[Field] = &[
    field!("partitionIndex", INT32, 0),
    field!("errorCode", INT16, 0),
];
const OFFSET_COMMIT_TOPIC_RESPONSE: &[Field] = &[
    field!("name", STRING, 0),
    field!("partitions", array!(OFFSET_COMMIT_PARTITION_RESPONSE), 0),
];
schema!(OFFSET_COMMIT_RESPONSE, OffsetCommit, 0..=8, &[
    field!("throttleTimeMs", INT32, 3),
    field!("topics", array!(OFFSET_COMMIT_TOPIC_RESPONSE), 0),
]);

// OffsetFetch (9)

const OFFSET_FETCH_TOPIC: &[Field] = &[
    field!("name", STRING, 0),
    field!("partitionIndexes", INT32S, 0),
];
schema!(OFFSET_FETCH_REQUEST, OffsetFetch, 0..=7, &[
    field!("groupId", STRING, 0),
    field!("topics", array!(OFFSET_FETCH_TOPIC), 0),
    field!("requireStable", BOOL, 7),
]);

const OFFSET_FETCH_PARTITION_RESPONSE: &[Field] = &[
    field!("partitionIndex", INT32, 0),
    field!("committedOffset", INT64, 0),
    field!("committedLeaderEpoch", INT32, 5),
    field!("metadata", STRING, 0),
    field!("errorCode", INT16, 0),
];
const OFFSET_FETCH_TOPIC_RESPONSE: &[Field] = &[
    field!("name", STRING, 0),
    field!("partitions", array!(OFFSET_FETCH_PARTITION_RESPONSE), 0),
];
schema!(OFFSET_FETCH_RESPONSE, OffsetFetch, 0..=7, &[
    field!("throttleTimeMs", INT32, 3),
    field!("topics", array!(OFFSET_FETCH_TOPIC_RESPONSE), 0),
    field!("errorCode", INT16, 2),
]);

// FindCoordinator (10)

schema!(FIND_COORDINATOR_REQUEST, FindCoordinator, 0..=3, &[
    field!("key", STRING, 0),
    field!("keyType", INT8, 1),
]);
schema!(FIND_COORDINATOR_RESPONSE, FindCoordinator, 0..=3, &[
    field!("throttleTimeMs", INT32, 1),
    field!("errorCode", INT16, 0),
    field!("errorMessage", STRING, 1),
    field!("nodeId", INT32, 0),
    field!("host", STRING, 0),
    field!("port", INT32, 0),
]);

// JoinGroup (11)

const JOIN_GROUP_PROTOCOL: &[Field] = &[
    field!("name", STRING, 0),
    field!("metadata", BYTES, 0),
];
schema!(JOIN_GROUP_REQUEST, JoinGroup, 0..=7, &[
    field!("groupId", STRING, 0),
    field!("sessionTimeoutMs", INT32, 0),
    field!("rebalanceTimeoutMs", INT32, 1),
    field!("memberId", STRING, 0),
    field!("groupInstanceId", STRING, 5),
    field!("protocolType", STRING, 0),
    field!("protocols", array!(JOIN_GROUP_PROTOCOL), 0),
]);

const JOIN_GROUP_MEMBER: &[Field] = &[
    field!("memberId", STRING, 0),
    field!("groupInstanceId", STRING, 5),
    field!("metadata", BYTES, 0),
];
schema!(JOIN_GROUP_RESPONSE, JoinGroup, 0..=7, &[
    field!("throttleTimeMs", INT32, 2),
    field!("errorCode", INT16, 0),
    field!("generationId", INT32, 0),
    field!("protocolType", STRING, 7),
    field!("protocolName", STRING, 0),
    field!("leader", STRING, 0),
    field!("memberId", STRING, 0),
    field!("members", array!(JOIN_GROUP_MEMBER), 0),
]);

// Heartbeat (12)

schema!(HEARTBEAT_REQUEST, Heartbeat, 0..=4, &[
    field!("groupId", STRING, 0),
    field!("generationId", INT32, 0),
    field!("memberId", STRING, 0),
    field!("groupInstanceId", STRING, 3),
]);
schema!(HEARTBEAT_RESPONSE, Heartbeat, 0..=4, &[
    field!("throttleTimeMs", INT32, 1),
    field!("errorCode", INT16, 0),
]);

// LeaveGroup (13)

const LEAVE_GROUP_MEMBER: &[Field] = &[
    field!("memberId", STRING, 3),
    field!("groupInstanceId", STRING, 3),
];
schema!(LEAVE_GROUP_REQUEST, LeaveGroup, 0..=4, &[
    field!("groupId", STRING, 0),
    field!("memberId", STRING, 0, 2),
    field!("members", array!(LEAVE_GROUP_MEMBER), 3),
]);

const LEAVE_GROUP_MEMBER_RESPONSE: &[Field] = &[
    field!("memberId", STRING, 3),
    field!("groupInstanceId", STRING, 3),
    field!("errorCode", INT16, 3),
];
schema!(LEAVE_GROUP_RESPONSE, LeaveGroup, 0..=4, &[
    field!("throttleTimeMs", INT32, 1),
    field!("errorCode", INT16, 0),
    field!("members", array!(LEAVE_GROUP_MEMBER_RESPONSE), 3),
]);

// SyncGroup (14)

const SYNC_GROUP_ASSIGNMENT: &[Field] = &[
    field!("memberId", STRING, 0),
    field!("assignment", BYTES, 0),
];
schema!(SYNC_GROUP_REQUEST, SyncGroup, 0..=4, &[
    field!("groupId", STRING, 0),
    field!("generationId", INT32, 0),
    field!("memberId", STRING, 0),
    field!("groupInstanceId", STRING, 3),
    field!("assignments", array!(SYNC_GROUP_ASSIGNMENT), 0),
]);
schema!(SYNC_GROUP_RESPONSE, SyncGroup, 0..=4, &[
    field!("throttleTimeMs", INT32, 1),
    field!("errorCode", INT16, 0),
    field!("assignment", BYTES, 0),
]);

// DescribeGroups (15)

schema!(DESCRIBE_GROUPS_REQUEST, DescribeGroups, 0..=5, &[
    field!("groups", STRINGS, 0),
    field!("includeAuthorizedOperations", BOOL, 3),
]);

const DESCRIBE_GROUPS_MEMBER: &[Field] = &[
    field!("memberId", STRING, 0),
    field!("groupInstanceId", STRING, 4),
    field!("clientId", STRING, 0),
    field!("clientHost", STRING, 0),
    field!("memberMetadata", BYTES, 0),
    field!("memberAssignment", BYTES, 0),
];
const DESCRIBE_GROUPS_GROUP: &[Field] = &[
    field!("errorCode", INT16, 0),
    field!("groupId", STRING, 0),
    field!("groupState", STRING, 0),
    field!("protocolType", STRING, 0),
    field!("protocolData", STRING, 0),
    field!("members", array!(DESCRIBE_GROUPS_MEMBER), 0),
    field!("authorizedOperations", INT32, 3),
];
schema!(DESCRIBE_GROUPS_RESPONSE, DescribeGroups, 0..=5, &[
    field!("throttleTimeMs", INT32, 1),
    field!("groups", array!(DESCRIBE_GROUPS_GROUP), 0),
]);

// ListGroups (16)

schema!(LIST_GROUPS_REQUEST, ListGroups, 0..=4, &[
    field!("statesFilter", STRINGS, 4),
]);

const LIST_GROUPS_GROUP: &[Field] = &[
    field!("groupId", STRING, 0),
    field!("protocolType", STRING, 0),
    field!("groupState", STRING, 4),
];
schema!(LIST_GROUPS_RESPONSE, ListGroups, 0..=4, &[
    field!("throttleTimeMs", INT32, 1),
    field!("errorCode", INT16, 0),
    field!("groups", array!(LIST_GROUPS_GROUP), 0),
]);

// SaslHandshake (17)

schema!(SASL_HANDSHAKE_REQUEST, SaslHandshake, 0..=1, &[
    field!("mechanism", STRING, 0),
]);
schema!(SASL_HANDSHAKE_RESPONSE, SaslHandshake, 0..=1, &[
    field!("errorCode", INT16, 0),
    field!("mechanisms", STRINGS, 0),
]);

// ApiVersions (18)

schema!(API_VERSIONS_REQUEST, ApiVersions, 0..=3, &[
    field!("clientSoftwareName", STRING, 3),
    field!("clientSoftwareVersion", STRING, 3),
]);

const API_VERSIONS_KEY: &[Field] = &[
    field!("apiKey", INT16, 0),
    field!("minVersion", INT16, 0),
    field!("maxVersion", INT16, 0),
];
const API_VERSIONS_SUPPORTED_FEATURE: &[Field] = &[
    field!("name", STRING, 3),
    field!("minVersion", INT16, 3),
    field!("maxVersion", INT16, 3),
];
const API_VERSIONS_FINALIZED_FEATURE: &[Field] = &[
    field!("name", STRING, 3),
    field!("maxVersionLevel", INT16, 3),
    field!("minVersionLevel", INT16, 3),
];
schema!(API_VERSIONS_RESPONSE, ApiVersions, 0..=3, &[
    field!("errorCode", INT16, 0),
    field!("apiKeys", array!(API_VERSIONS_KEY), 0),
    field!("throttleTimeMs", INT32, 1),
    tagged!("supportedFeatures", array!(API_VERSIONS_SUPPORTED_FEATURE), 3, 0),
    tagged!("finalizedFeaturesEpoch", INT64, 3, 1),
    tagged!("finalizedFeatures", array!(API_VERSIONS_FINALIZED_FEATURE), 3, 2),
    tagged!("zkMigrationReady", BOOL, 3, 3),
]);

// CreateTopics (19)

const CREATE_TOPICS_ASSIGNMENT: &[Field] = &[
    field!("partitionIndex", INT32, 0),
    field!("brokerIds", INT32S, 0),
];
const CREATE_TOPICS_CONFIG: &[Field] = &[
    field!("name", STRING, 0),
    field!("value", STRING, 0),
];
const CREATE_TOPICS_TOPIC: &[Field] = &[
    field!("name", STRING, 0),
    field!("numPartitions", INT32, 0),
    field!("replicationFactor", INT16, 0),
    field!("assignments", array!(CREATE_TOPICS_ASSIGNMENT), 0),
    field!("configs", array!(CREATE_TOPICS_CONFIG), 0),
];
schema!(CREATE_TOPICS_REQUEST, CreateTopics, 0..=7, &[
    field!("topics", array!(CREATE_TOPICS_TOPIC), 0),
    field!("timeoutMs", INT32, 0),
    field!("validateOnly", BOOL, 1),
]);

const CREATE_TOPICS_CONFIG_RESPONSE: &[Field] = &[
    field!("name", STRING, 5),
    field!("value", STRING, 5),
    field!("readOnly", BOOL, 5),
    field!("configSource", INT8, 5),
    field!("isSensitive", BOOL, 5),
];
const CREATE_TOPICS_TOPIC_RESPONSE: &[Field] = &[
    field!("name", STRING, 0),
    field!("topicId", UUID, 7),
    field!("errorCode", INT16, 0),
    field!("errorMessage", STRING, 1),
    tagged!("topicConfigErrorCode", INT16, 5, 0),
    field!("numPartitions", INT32, 5),
    field!("replicationFactor", INT16, 5),
    field!("configs", array!(CREATE_TOPICS_CONFIG_RESPONSE), 5),
];
schema!(CREATE_TOPICS_RESPONSE, CreateTopics, 0..=7, &[
    field!("throttleTimeMs", INT32, 2),
    field!("topics", array!(CREATE_TOPICS_TOPIC_RESPONSE), 0),
]);

// DeleteTopics (20)

const DELETE_TOPICS_TOPIC: &[Field] = &[
    field!("name", STRING, 6),
    field!("topicId", UUID, 6),
];
schema!(DELETE_TOPICS_REQUEST, DeleteTopics, 0..=6, &[
    field!("topics", array!(DELETE_TOPICS_TOPIC), 6),
    field!("topicNames", STRINGS, 0, 5),
    field!("timeoutMs", INT32, 0),
]);

const DELETE_TOPICS_RESULT: &[Field] = &[
    field!("name", STRING, 0),
    field!("topicId", UUID, 6),
    field!("errorCode", INT16, 0),
    field!("errorMessage", STRING, 5),
];
schema!(DELETE_TOPICS_RESPONSE, DeleteTopics, 0..=6, &[
    field!("throttleTimeMs", INT32, 1),
    field!("responses", array!(DELETE_TOPICS_RESULT), 0),
]);

// InitProducerId (22)

schema!(INIT_PRODUCER_ID_REQUEST, InitProducerId, 0..=4, &[
    field!("transactionalId", STRING, 0),
    field!("transactionTimeoutMs", INT32, 0),
    field!("producerId", INT64, 3),
    field!("producerEpoch", INT16, 3),
]);
schema!(INIT_PRODUCER_ID_RESPONSE, InitProducerId, 0..=4, &[
    field!("throttleTimeMs", INT32, 0),
    field!("errorCode", INT16, 0),
    field!("producerId", INT64, 0),
    field!("producerEpoch", INT16, 0),
]);

// SaslAuthenticate (36)

schema!(SASL_AUTHENTICATE_REQUEST, SaslAuthenticate, 0..=2, &[
    field!("authBytes", BYTES, 0),
]);
schema!(SASL_AUTHENTICATE_RESPONSE, SaslAuthenticate, 0..=2, &[
    field!("errorCode", INT16, 0),
    field!("errorMessage", STRING, 0),
    field!("authBytes", BYTES, 0),
    field!("sessionLifetimeMs", INT64, 1),
]);

// CreatePartitions (37)

const CREATE_PARTITIONS_ASSIGNMENT: &[Field] = &[
    field!("brokerIds", INT32S, 0),
];
const CREATE_PARTITIONS_TOPIC: &[Field] = &[
    field!("name", STRING, 0),
    field!("count", INT32, 0),
    field!("assignments", array!(CREATE_PARTITIONS_ASSIGNMENT), 0),
];
schema!(CREATE_PARTITIONS_REQUEST, CreatePartitions, 0..=3, &[
    field!("topics", array!(CREATE_PARTITIONS_TOPIC), 0),
    field!("timeoutMs", INT32, 0),
    field!("validateOnly", BOOL, 0),
]);

const CREATE_PARTITIONS_RESULT: &[Field] = &[
    field!("name", STRING, 0),
    field!("errorCode", INT16, 0),
    field!("errorMessage", STRING, 0),
];
schema!(CREATE_PARTITIONS_RESPONSE, CreatePartitions, 0..=3, &[
    field!("throttleTimeMs", INT32, 0),
    field!("results", array!(CREATE_PARTITIONS_RESULT), 0),
]);

// DeleteGroups (42)

schema!(DELETE_GROUPS_REQUEST, DeleteGroups, 0..=2, &[
    field!("groupsNames", STRINGS, 0),
]);

const DELETE_GROUPS_RESULT: &[Field] = &[
    field!("groupId", STRING, 0),
    field!("errorCode", INT16, 0),
];
schema!(DELETE_GROUPS_RESPONSE, DeleteGroups, 0..=2, &[
    field!("throttleTimeMs", INT32, 0),
    field!("results", array!(DELETE_GROUPS_RESULT), 0),
]);

/// Request schema of `api_key`, if the API is decoded.
#[must_use]
pub fn request(api_key: ApiKey) -> Option<&'static MessageSchema> {
    Some(match api_key {
        ApiKey::Produce => &PRODUCE_REQUEST,
        ApiKey::Fetch => &FETCH_REQUEST,
        ApiKey::ListOffsets => &LIST_OFFSETS_REQUEST,
        ApiKey::Metadata => &METADATA_REQUEST,
        ApiKey::OffsetCommit => &OFFSET_COMMIT_REQUEST,
        ApiKey::OffsetFetch => &OFFSET_FETCH_REQUEST,
        ApiKey::FindCoordinator => &FIND_COORDINATOR_REQUEST,
        ApiKey::JoinGroup => &JOIN_GROUP_REQUEST,
        ApiKey::Heartbeat => &HEARTBEAT_REQUEST,
        ApiKey::LeaveGroup => &LEAVE_GROUP_REQUEST,
        ApiKey::SyncGroup => &SYNC_GROUP_REQUEST,
        ApiKey::DescribeGroups => &DESCRIBE_GROUPS_REQUEST,
        ApiKey::ListGroups => &LIST_GROUPS_REQUEST,
        ApiKey::SaslHandshake => &SASL_HANDSHAKE_REQUEST,
        ApiKey::ApiVersions => &API_VERSIONS_REQUEST,
        ApiKey::CreateTopics => &CREATE_TOPICS_REQUEST,
        ApiKey::DeleteTopics => &DELETE_TOPICS_REQUEST,
        ApiKey::InitProducerId => &INIT_PRODUCER_ID_REQUEST,
        ApiKey::SaslAuthenticate => &SASL_AUTHENTICATE_REQUEST,
        ApiKey::CreatePartitions => &CREATE_PARTITIONS_REQUEST,
        ApiKey::DeleteGroups => &DELETE_GROUPS_REQUEST,
        _ => return None,
    })
}

/// Response schema of `api_key`, if the API is decoded.
#[must_use]
pub fn response(api_key: ApiKey) -> Option<&'static MessageSchema> {
    Some(match api_key {
        ApiKey::Produce => &PRODUCE_RESPONSE,
        ApiKey::Fetch => &FETCH_RESPONSE,
        ApiKey::ListOffsets => &LIST_OFFSETS_RESPONSE,
        ApiKey::Metadata => &METADATA_RESPONSE,
        ApiKey::OffsetCommit => &OFFSET_COMMIT_RESPONSE,
        ApiKey::OffsetFetch => &OFFSET_FETCH_RESPONSE,
        ApiKey::FindCoordinator => &FIND_COORDINATOR_RESPONSE,
        ApiKey::JoinGroup => &JOIN_GROUP_RESPONSE,
        ApiKey::Heartbeat => &HEARTBEAT_RESPONSE,
        ApiKey::LeaveGroup => &LEAVE_GROUP_RESPONSE,
        ApiKey::SyncGroup => &SYNC_GROUP_RESPONSE,
        ApiKey::DescribeGroups => &DESCRIBE_GROUPS_RESPONSE,
        ApiKey::ListGroups => &LIST_GROUPS_RESPONSE,
        ApiKey::SaslHandshake => &SASL_HANDSHAKE_RESPONSE,
        ApiKey::ApiVersions => &API_VERSIONS_RESPONSE,
        ApiKey::CreateTopics => &CREATE_TOPICS_RESPONSE,
        ApiKey::DeleteTopics => &DELETE_TOPICS_RESPONSE,
        ApiKey::InitProducerId => &INIT_PRODUCER_ID_RESPONSE,
        ApiKey::SaslAuthenticate => &SASL_AUTHENTICATE_RESPONSE,
        ApiKey::CreatePartitions => &CREATE_PARTITIONS_RESPONSE,
        ApiKey::DeleteGroups => &DELETE_GROUPS_RESPONSE,
        _ => return None,
    })
}
