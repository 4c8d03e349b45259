//! `mongodb_client`: database credentials from the MongoDB charm

use std::fmt;

use serde::Deserialize;
use tracing::debug;

use crate::controller::collector::collect;
use crate::model::{DatabagEncoding, Model};

pub const DATABASE: &str = "database";

/// Database the requirer asks for; `admin` so the workload can create its own
pub const DATABASE_NAME: &str = "admin";
pub const EXTRA_USER_ROLES: &str = "admin";

/// Credentials published by the database provider; extra keys are ignored
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct DatabaseConfig {
    pub uris: String,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("uris", &self.uris)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

pub fn database_config(model: &Model) -> Option<DatabaseConfig> {
    collect(model, DATABASE, DatabagEncoding::Plain)
}

/// Ask the provider for credentials; app data, so leader only
pub fn request_database(model: &mut Model) {
    for relation in model.relations_mut(DATABASE) {
        relation
            .local_app_data
            .insert("database".to_string(), DATABASE_NAME.to_string());
        relation
            .local_app_data
            .insert("extra-user-roles".to_string(), EXTRA_USER_ROLES.to_string());
        debug!("Requested database on relation {}", relation.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::databag;

    #[test]
    fn test_complete_databag_is_present() {
        let mut model = Model::new("test", "backend");
        model.relate(
            DATABASE,
            Some(databag([
                ("username", "admin"),
                ("password", "pass"),
                ("uris", "uri.fqdn.1:port,uri.fqdn.2:port"),
                ("replset", "rs0"),
            ])),
        );
        let config = database_config(&model).unwrap();
        assert_eq!(config.username, "admin");
        assert_eq!(config.uris, "uri.fqdn.1:port,uri.fqdn.2:port");
        assert!(!format!("{config:?}").contains("pass\""));
    }

    #[test]
    fn test_partial_or_empty_databag_is_absent() {
        for bag in [
            databag([]),
            databag([("username", "admin"), ("password", "pass")]),
        ] {
            let mut model = Model::new("test", "backend");
            model.relate(DATABASE, Some(bag));
            assert!(database_config(&model).is_none());
        }
    }

    #[test]
    fn test_request_sets_database_and_roles() {
        let mut model = Model::new("test", "backend");
        model.relate(DATABASE, None);
        request_database(&mut model);
        let data = &model.get_relation(DATABASE).unwrap().local_app_data;
        assert_eq!(data["database"], "admin");
        assert_eq!(data["extra-user-roles"], "admin");
    }
}
