//! Cluster-wide diagnostic view built from per-node INFO replies
//!
//! Every stat keeps one value per primary, in primary order. The
//! keyspace line for the configured database is the exception: it is
//! collapsed into a single `keys=<k>,expires=<e>,avg_ttl=<t>` summary
//! so callers see one coherent count for the whole cluster.

use std::collections::HashMap;

/// Aggregated statistics: stat name -> one value per node
#[derive(Debug, Clone, Default)]
pub struct CacheInfo {
    pub fields: HashMap<String, Vec<String>>,
}

impl CacheInfo {
    /// Parsed keyspace summary for a database, when present
    pub fn keyspace(&self, database: u32) -> Option<KeyspaceSummary> {
        let line = self.fields.get(&db_field(database))?.first()?;
        Some(parse_keyspace_line(line))
    }
}

/// Totals from a `db<N>` keyspace line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyspaceSummary {
    pub keys: u64,
    pub expires: u64,
    pub avg_ttl: u64,
}

fn db_field(database: u32) -> String {
    format!("db{}", database)
}

/// Merge raw INFO texts (one per primary, in primary order) into the
/// aggregated view, synthesizing the keyspace summary for `database`.
pub fn aggregate_info(node_infos: &[String], database: u32) -> CacheInfo {
    let mut info = CacheInfo::default();

    for raw in node_infos {
        parse_info_text(raw, &mut info.fields);
    }

    // Collapse the per-node keyspace lines into one summary entry.
    // Note: avg_ttl is the sum of per-node averages divided by the node
    // count, unweighted by key count. Kept for parity with the
    // single-node handler's consumers.
    let db = db_field(database);
    let node_count = node_infos.len();
    let mut totals = KeyspaceSummary::default();

    if let Some(lines) = info.fields.get(&db) {
        for line in lines {
            let parsed = parse_keyspace_line(line);
            totals.keys += parsed.keys;
            totals.expires += parsed.expires;
            totals.avg_ttl += parsed.avg_ttl;
        }
    }
    if node_count > 0 {
        totals.avg_ttl /= node_count as u64;
    }

    info.fields.insert(db, vec![render_keyspace(&totals)]);
    info
}

/// Parse one node's INFO text, appending each stat value to its list.
/// Section headers (`# Keyspace`) and blank lines are skipped.
fn parse_info_text(raw: &str, fields: &mut HashMap<String, Vec<String>>) {
    for line in raw.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            fields
                .entry(name.to_string())
                .or_default()
                .push(value.to_string());
        }
    }
}

/// Parse a `keys=1,expires=0,avg_ttl=0` keyspace line. Unknown
/// sub-fields and malformed pairs are ignored.
pub fn parse_keyspace_line(line: &str) -> KeyspaceSummary {
    let mut summary = KeyspaceSummary::default();
    for pair in line.split(',') {
        let Some((name, value)) = pair.split_once('=') else {
            continue;
        };
        let value: u64 = value.trim().parse().unwrap_or(0);
        match name.trim() {
            "keys" => summary.keys = value,
            "expires" => summary.expires = value,
            "avg_ttl" => summary.avg_ttl = value,
            _ => {}
        }
    }
    summary
}

fn render_keyspace(summary: &KeyspaceSummary) -> String {
    format!(
        "keys={},expires={},avg_ttl={}",
        summary.keys, summary.expires, summary.avg_ttl
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node_info(clients: u32, keyspace: Option<&str>) -> String {
        let mut raw = format!(
            "# Clients\r\nconnected_clients:{}\r\n\r\n# Keyspace\r\n",
            clients
        );
        if let Some(line) = keyspace {
            raw.push_str(&format!("db0:{}\r\n", line));
        }
        raw
    }

    #[test]
    fn test_per_node_lists_in_node_order() {
        let infos = vec![
            node_info(3, Some("keys=10,expires=2,avg_ttl=100")),
            node_info(5, Some("keys=20,expires=4,avg_ttl=300")),
        ];
        let info = aggregate_info(&infos, 0);
        assert_eq!(
            info.fields.get("connected_clients"),
            Some(&vec!["3".to_string(), "5".to_string()])
        );
    }

    #[test]
    fn test_keyspace_line_collapsed_to_sums() {
        let infos = vec![
            node_info(1, Some("keys=10,expires=2,avg_ttl=100")),
            node_info(1, Some("keys=20,expires=4,avg_ttl=300")),
            node_info(1, Some("keys=12,expires=0,avg_ttl=200")),
        ];
        let info = aggregate_info(&infos, 0);

        // keys and expires summed; avg_ttl averaged over node count
        assert_eq!(
            info.fields.get("db0"),
            Some(&vec!["keys=42,expires=6,avg_ttl=200".to_string()])
        );
        assert_eq!(
            info.keyspace(0),
            Some(KeyspaceSummary {
                keys: 42,
                expires: 6,
                avg_ttl: 200,
            })
        );
    }

    #[test]
    fn test_node_without_keyspace_line_contributes_zeros() {
        let infos = vec![
            node_info(1, Some("keys=10,expires=2,avg_ttl=100")),
            node_info(1, None),
        ];
        let info = aggregate_info(&infos, 0);
        assert_eq!(
            info.fields.get("db0"),
            Some(&vec!["keys=10,expires=2,avg_ttl=50".to_string()])
        );
    }

    #[test]
    fn test_empty_cluster_yields_zero_summary() {
        let info = aggregate_info(&[], 0);
        assert_eq!(
            info.fields.get("db0"),
            Some(&vec!["keys=0,expires=0,avg_ttl=0".to_string()])
        );
    }

    #[test]
    fn test_parse_keyspace_line_ignores_unknown_fields() {
        let summary = parse_keyspace_line("keys=7,expires=1,avg_ttl=9,subexpiry=0");
        assert_eq!(summary.keys, 7);
        assert_eq!(summary.expires, 1);
        assert_eq!(summary.avg_ttl, 9);
    }
}
