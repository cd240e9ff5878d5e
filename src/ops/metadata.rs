/*!
 * User metadata: read, attach and query attribute/value/units triples
 */

use gridlink_core_resilience::BatchReport;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{require_remote_path, require_remote_paths, OpContext};
use crate::backend::{render_query, Avu, MetadataCondition};
use crate::error::{GridError, Result};
use crate::session::Session;

pub const GET_METADATA: &str = "get_metadata";
pub const ADD_METADATA: &str = "add_metadata";
pub const QUERY_METADATA: &str = "query_metadata";

/// Metadata triples attached to one path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathMetadata {
    pub path: String,
    pub avus: Vec<Avu>,
}

/// Read the metadata of each path. Missing paths become failure lines.
pub fn get_metadata(
    session: &mut Session,
    ctx: &mut OpContext,
    paths: &[String],
) -> Result<(Vec<PathMetadata>, BatchReport)> {
    require_remote_paths("paths", paths)?;

    session.with_session(GET_METADATA, |fs| {
        let mut entries = Vec::new();
        let mut report = BatchReport::new();
        for remote in paths {
            match fs.get_metadata(remote) {
                Ok(avus) => {
                    report.record_success(remote.clone());
                    entries.push(PathMetadata {
                        path: remote.clone(),
                        avus,
                    });
                }
                Err(e) => ctx.item_failed(&mut report, remote, e.into())?,
            }
        }
        Ok((entries, report))
    })
}

/// Attach `avu` to each path
pub fn add_metadata(
    session: &mut Session,
    ctx: &mut OpContext,
    paths: &[String],
    avu: &Avu,
) -> Result<BatchReport> {
    require_remote_paths("paths", paths)?;
    if avu.attribute.trim().is_empty() {
        return Err(GridError::validation("metadata attribute must not be empty"));
    }

    session.with_session(ADD_METADATA, |fs| {
        let mut report = BatchReport::new();
        for remote in paths {
            match fs.add_metadata(remote, avu) {
                Ok(()) => report.record_success(remote.clone()),
                Err(e) => ctx.item_failed(&mut report, remote, e.into())?,
            }
        }
        Ok(report)
    })
}

/// Paths under `scope` whose metadata satisfies every condition
pub fn query_metadata(
    session: &mut Session,
    scope: &str,
    conditions: &[MetadataCondition],
) -> Result<Vec<String>> {
    require_remote_path("scope", scope)?;
    if conditions.is_empty() {
        return Err(GridError::validation("a metadata query needs at least one condition"));
    }
    if conditions.iter().any(|c| c.attribute.trim().is_empty()) {
        return Err(GridError::validation("metadata attribute must not be empty"));
    }

    debug!("Querying {} where {}", scope, render_query(conditions));
    session.with_session(QUERY_METADATA, |fs| {
        let mut found = fs.query_metadata(scope, conditions)?;
        found.sort();
        found.dedup();
        Ok(found)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MemoryDriver, Operator};
    use crate::config::Account;
    use std::sync::Arc;

    fn setup() -> (MemoryDriver, Session) {
        let driver = MemoryDriver::new();
        driver.add_file("/obs/adcp_2008.bin", b"");
        driver.add_file("/obs/ctd_2009.csv", b"");
        let session = Session::new(Arc::new(driver.clone()), Account::default());
        (driver, session)
    }

    #[test]
    fn test_add_then_get() {
        let (_driver, mut session) = setup();
        let mut ctx = OpContext::new();
        let paths = vec!["/obs/adcp_2008.bin".to_string()];

        let avu = Avu::new("depth", "12").with_units("m");
        let report = add_metadata(&mut session, &mut ctx, &paths, &avu).unwrap();
        assert!(report.is_success());

        let (entries, report) = get_metadata(&mut session, &mut ctx, &paths).unwrap();
        assert!(report.is_success());
        assert_eq!(entries[0].avus, vec![avu]);
    }

    #[test]
    fn test_get_missing_path_is_item_failure() {
        let (_driver, mut session) = setup();
        let paths = vec!["/obs/nope".to_string(), "/obs/ctd_2009.csv".to_string()];
        let (entries, report) = get_metadata(&mut session, &mut OpContext::new(), &paths).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(report.exit_message(), "file /obs/nope does not exist.\n");
    }

    #[test]
    fn test_empty_attribute_rejected_without_connecting() {
        let (driver, mut session) = setup();
        let paths = vec!["/obs/adcp_2008.bin".to_string()];
        let err = add_metadata(&mut session, &mut OpContext::new(), &paths, &Avu::new(" ", "x"))
            .unwrap_err();
        assert!(matches!(err, GridError::Validation(_)));

        let err = query_metadata(&mut session, "/obs", &[]).unwrap_err();
        assert!(matches!(err, GridError::Validation(_)));
        assert_eq!(driver.connect_attempts(), 0);
    }

    #[test]
    fn test_query_combines_conditions() {
        let (driver, mut session) = setup();
        driver.attach_metadata("/obs/adcp_2008.bin", Avu::new("site", "Kaneohe"));
        driver.attach_metadata("/obs/adcp_2008.bin", Avu::new("year", "2008"));
        driver.attach_metadata("/obs/ctd_2009.csv", Avu::new("site", "Kaneohe Bay"));
        driver.attach_metadata("/obs/ctd_2009.csv", Avu::new("year", "2009"));

        let conditions = vec![
            MetadataCondition::new("site", Operator::Like, "Kaneohe%"),
            MetadataCondition::new("year", Operator::GreaterOrEqual, "2009"),
        ];
        let found = query_metadata(&mut session, "/obs", &conditions).unwrap();
        assert_eq!(found, vec!["/obs/ctd_2009.csv".to_string()]);
    }
}
