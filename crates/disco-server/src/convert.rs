use disco_proto::v1;
use disco_registry::Service;
use disco_types::{DiscoError, Entry};
use tonic::Status;
use uuid::Uuid;

pub fn entry_to_proto(entry: Entry) -> v1::Entry {
    v1::Entry {
        key: entry.key,
        value: entry.value,
        version: entry.version,
        origin: entry.origin,
        timestamp_ms: entry.timestamp_ms,
        max_age_ms: entry.max_age_ms.unwrap_or(0),
    }
}

/// Structural validation happens when the entry is merged.
pub fn entry_from_proto(entry: v1::Entry) -> Entry {
    Entry {
        key: entry.key,
        value: entry.value,
        version: entry.version,
        origin: entry.origin,
        timestamp_ms: entry.timestamp_ms,
        max_age_ms: (entry.max_age_ms != 0).then_some(entry.max_age_ms),
    }
}

pub fn service_to_proto(service: Service) -> v1::Service {
    v1::Service {
        id: service.id.to_string(),
        node_id: service.node_id.map(|id| id.to_string()).unwrap_or_default(),
        r#type: service.service_type,
        pool: service.pool,
        location: service.location,
        properties: service.properties.into_iter().collect(),
    }
}

pub fn parse_uuid(field: &str, raw: &str) -> Result<Uuid, Status> {
    Uuid::parse_str(raw).map_err(|_| Status::invalid_argument(format!("invalid {field}: '{raw}'")))
}

pub fn disco_to_status(err: DiscoError) -> Status {
    match &err {
        DiscoError::NotFound => Status::not_found(err.to_string()),
        DiscoError::Timeout => Status::deadline_exceeded(err.to_string()),
        DiscoError::InvalidArgument(_) | DiscoError::Codec(_) => {
            Status::invalid_argument(err.to_string())
        }
        DiscoError::Transport(_) => Status::unavailable(err.to_string()),
        DiscoError::Storage(_) => Status::internal(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_max_age_means_no_ttl() {
        let e = entry_from_proto(v1::Entry {
            key: b"k".to_vec(),
            value: None,
            version: 3,
            origin: "n1".into(),
            timestamp_ms: 42,
            max_age_ms: 0,
        });
        assert_eq!(e.max_age_ms, None);
        assert!(e.is_tombstone());
        assert_eq!(entry_to_proto(e).max_age_ms, 0);
    }

    #[test]
    fn error_codes() {
        assert_eq!(disco_to_status(DiscoError::NotFound).code(), tonic::Code::NotFound);
        assert_eq!(
            disco_to_status(DiscoError::InvalidArgument("x".into())).code(),
            tonic::Code::InvalidArgument
        );
        assert_eq!(disco_to_status(DiscoError::Storage("x".into())).code(), tonic::Code::Internal);
        assert_eq!(disco_to_status(DiscoError::Timeout).code(), tonic::Code::DeadlineExceeded);
    }

    #[test]
    fn bad_uuid_is_invalid_argument() {
        assert_eq!(parse_uuid("node_id", "nope").unwrap_err().code(), tonic::Code::InvalidArgument);
        assert!(parse_uuid("node_id", &Uuid::new_v4().to_string()).is_ok());
    }
}
