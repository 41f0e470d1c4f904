//! Kafka API keys and their header versions.

use serde::Serialize;

use crate::error::KafkaError;

macro_rules! api_keys {
    ($($variant:ident = $code:literal, flexible: $flex:expr;)*) => {
        /// Kafka API key.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        pub enum ApiKey {
            $($variant,)*
        }

        impl ApiKey {
            /// Every key, in code order.
            pub const ALL: &'static [ApiKey] = &[$(ApiKey::$variant,)*];

            /// Wire value.
            #[must_use]
            pub fn code(self) -> i16 {
                match self {
                    $(Self::$variant => $code,)*
                }
            }

            /// Protocol name, e.g. `"ApiVersions"`.
            #[must_use]
            pub fn name(self) -> &'static str {
                match self {
                    $(Self::$variant => stringify!($variant),)*
                }
            }

            /// First version using flexible encodings, if any.
            #[must_use]
            pub fn first_flexible_version(self) -> Option<i16> {
                match self {
                    $(Self::$variant => $flex,)*
                }
            }
        }

        impl TryFrom<i16> for ApiKey {
            type Error = KafkaError;

            fn try_from(code: i16) -> Result<Self, Self::Error> {
                match code {
                    $($code => Ok(Self::$variant),)*
                    other => Err(KafkaError::UnknownApiKey(other)),
                }
            }
        }
    };
}

api_keys! {
    Produce = 0, flexible: Some(9);
    Fetch = 1, flexible: Some(12);
    ListOffsets = 2, flexible: Some(6);
    Metadata = 3, flexible: Some(9);
    LeaderAndIsr = 4, flexible: Some(4);
    StopReplica = 5, flexible: Some(2);
    UpdateMetadata = 6, flexible: Some(6);
    ControlledShutdown = 7, flexible: Some(3);
    OffsetCommit = 8, flexible: Some(8);
    OffsetFetch = 9, flexible: Some(6);
    FindCoordinator = 10, flexible: Some(3);
    JoinGroup = 11, flexible: Some(6);
    Heartbeat = 12, flexible: Some(4);
    LeaveGroup = 13, flexible: Some(4);
    SyncGroup = 14, flexible: Some(4);
    DescribeGroups = 15, flexible: Some(5);
    ListGroups = 16, flexible: Some(3);
    SaslHandshake = 17, flexible: None;
    ApiVersions = 18, flexible: Some(3);
    CreateTopics = 19, flexible: Some(5);
    DeleteTopics = 20, flexible: Some(4);
    DeleteRecords = 21, flexible: Some(2);
    InitProducerId = 22, flexible: Some(2);
    OffsetForLeaderEpoch = 23, flexible: Some(4);
    AddPartitionsToTxn = 24, flexible: Some(3);
    AddOffsetsToTxn = 25, flexible: Some(3);
    EndTxn = 26, flexible: Some(3);
    WriteTxnMarkers = 27, flexible: Some(1);
    TxnOffsetCommit = 28, flexible: Some(3);
    DescribeAcls = 29, flexible: Some(2);
    CreateAcls = 30, flexible: Some(2);
    DeleteAcls = 31, flexible: Some(2);
    DescribeConfigs = 32, flexible: Some(4);
    AlterConfigs = 33, flexible: Some(2);
    AlterReplicaLogDirs = 34, flexible: Some(2);
    DescribeLogDirs = 35, flexible: Some(2);
    SaslAuthenticate = 36, flexible: Some(2);
    CreatePartitions = 37, flexible: Some(2);
    CreateDelegationToken = 38, flexible: Some(2);
    RenewDelegationToken = 39, flexible: Some(2);
    ExpireDelegationToken = 40, flexible: Some(2);
    DescribeDelegationToken = 41, flexible: Some(2);
    DeleteGroups = 42, flexible: Some(2);
    ElectLeaders = 43, flexible: Some(2);
    IncrementalAlterConfigs = 44, flexible: Some(1);
    AlterPartitionReassignments = 45, flexible: Some(0);
    ListPartitionReassignments = 46, flexible: Some(0);
    OffsetDelete = 47, flexible: None;
    DescribeClientQuotas = 48, flexible: Some(1);
    AlterClientQuotas = 49, flexible: Some(1);
}

impl ApiKey {
    /// Whether `version` uses compact strings, compact arrays and tag buffers.
    #[must_use]
    pub fn is_flexible(self, version: i16) -> bool {
        self.first_flexible_version()
            .is_some_and(|first| version >= first)
    }

    /// Request header version: 0 for ControlledShutdown v0, 2 for flexible
    /// versions, 1 otherwise.
    #[must_use]
    pub fn request_header_version(self, version: i16) -> i16 {
        if self == Self::ControlledShutdown && version == 0 {
            0
        } else if self.is_flexible(version) {
            2
        } else {
            1
        }
    }

    /// Response header version: 1 for flexible versions, except
    /// ApiVersions which always uses 0.
    #[must_use]
    pub fn response_header_version(self, version: i16) -> i16 {
        if self != Self::ApiVersions && self.is_flexible(version) {
            1
        } else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_contiguous() {
        assert_eq!(ApiKey::ALL.len(), 50);
        for (expected, key) in ApiKey::ALL.iter().enumerate() {
            assert_eq!(key.code(), expected as i16);
            assert_eq!(ApiKey::try_from(key.code()).unwrap(), *key);
        }
    }

    #[test]
    fn test_unknown_code() {
        assert!(matches!(
            ApiKey::try_from(50),
            Err(KafkaError::UnknownApiKey(50))
        ));
        assert!(ApiKey::try_from(-1).is_err());
    }

    #[test]
    fn test_names() {
        assert_eq!(ApiKey::ApiVersions.name(), "ApiVersions");
        assert_eq!(ApiKey::Metadata.name(), "Metadata");
    }

    #[test]
    fn test_request_header_versions() {
        assert_eq!(ApiKey::ControlledShutdown.request_header_version(0), 0);
        assert_eq!(ApiKey::ControlledShutdown.request_header_version(1), 1);
        assert_eq!(ApiKey::Metadata.request_header_version(8), 1);
        assert_eq!(ApiKey::Metadata.request_header_version(9), 2);
        assert_eq!(ApiKey::SaslHandshake.request_header_version(1), 1);
        assert_eq!(ApiKey::AlterPartitionReassignments.request_header_version(0), 2);
    }

    #[test]
    fn test_response_header_versions() {
        assert_eq!(ApiKey::ApiVersions.response_header_version(3), 0);
        assert_eq!(ApiKey::Fetch.response_header_version(11), 0);
        assert_eq!(ApiKey::Fetch.response_header_version(12), 1);
        assert_eq!(ApiKey::OffsetDelete.response_header_version(0), 0);
    }
}
