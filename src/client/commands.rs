//! Command execution trait for node connections
//!
//! `Commands` abstracts "send a command, get a reply" so the higher
//! layers can run against a real connection or a scripted mock. The
//! extension trait carries the typed verbs the cache traffic uses.

use std::io;

use crate::client::raw_connection::RawConnection;
use crate::client::resp::{RespEncoder, RespValue};

/// Core command execution
pub trait Commands {
    /// Execute a command with string arguments
    fn execute(&mut self, args: &[&str]) -> io::Result<RespValue>;

    /// Execute a command with binary arguments
    fn execute_binary(&mut self, args: &[&[u8]]) -> io::Result<RespValue>;
}

impl Commands for RawConnection {
    fn execute(&mut self, args: &[&str]) -> io::Result<RespValue> {
        let byte_args: Vec<&[u8]> = args.iter().map(|s| s.as_bytes()).collect();
        self.execute_binary(&byte_args)
    }

    fn execute_binary(&mut self, args: &[&[u8]]) -> io::Result<RespValue> {
        let mut encoder = RespEncoder::with_capacity(64 + args.iter().map(|a| a.len()).sum::<usize>());
        encoder.encode_command(args);
        self.execute_encoded(&encoder)
    }
}

fn server_err(message: String) -> io::Error {
    io::Error::other(message)
}

fn unexpected(command: &str, reply: &RespValue) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("Unexpected {} reply: {}", command, reply.type_name()),
    )
}

fn expect_ok(command: &str, reply: RespValue) -> io::Result<()> {
    match reply {
        RespValue::SimpleString(s) if s == "OK" => Ok(()),
        RespValue::Error(e) => Err(server_err(e)),
        other => Err(unexpected(command, &other)),
    }
}

fn expect_int(command: &str, reply: RespValue) -> io::Result<i64> {
    match reply {
        RespValue::Integer(n) => Ok(n),
        RespValue::Error(e) => Err(server_err(e)),
        other => Err(unexpected(command, &other)),
    }
}

fn expect_text(command: &str, reply: RespValue) -> io::Result<String> {
    match reply {
        RespValue::BulkString(data) => String::from_utf8(data).map_err(|e| {
            io::Error::new(io::ErrorKind::InvalidData, format!("Invalid UTF-8: {}", e))
        }),
        RespValue::Error(e) => Err(server_err(e)),
        other => Err(unexpected(command, &other)),
    }
}

/// Parse a SCAN reply: `[next-cursor, [key, key, ...]]`
///
/// The cursor is the only completion signal; an empty key batch with a
/// non-zero cursor means "keep scanning".
pub fn parse_scan_reply(reply: &RespValue) -> io::Result<(u64, Vec<Vec<u8>>)> {
    if let RespValue::Error(e) = reply {
        return Err(server_err(e.clone()));
    }

    let items = reply
        .as_array()
        .filter(|items| items.len() == 2)
        .ok_or_else(|| unexpected("SCAN", reply))?;

    let cursor: u64 = items[0]
        .as_str()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| unexpected("SCAN", reply))?;

    let keys = items[1]
        .as_array()
        .ok_or_else(|| unexpected("SCAN", reply))?
        .iter()
        .filter_map(|k| match k {
            RespValue::BulkString(data) => Some(data.clone()),
            _ => None,
        })
        .collect();

    Ok((cursor, keys))
}

/// True for errors worth a reconnect-and-retry (broken transport), as
/// opposed to server replies and protocol violations.
pub fn is_transport_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::UnexpectedEof
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::TimedOut
            | io::ErrorKind::WouldBlock
    )
}

/// Typed verbs built on top of `Commands`
pub trait CommandsExt: Commands {
    fn ping(&mut self) -> io::Result<bool> {
        match self.execute(&["PING"])? {
            RespValue::SimpleString(s) => Ok(s == "PONG"),
            _ => Ok(false),
        }
    }

    fn auth(&mut self, password: &str, username: Option<&str>) -> io::Result<()> {
        let reply = match username {
            Some(user) => self.execute(&["AUTH", user, password])?,
            None => self.execute(&["AUTH", password])?,
        };
        expect_ok("AUTH", reply)
    }

    fn select_db(&mut self, db: u32) -> io::Result<()> {
        let db_str = db.to_string();
        let reply = self.execute(&["SELECT", &db_str])?;
        expect_ok("SELECT", reply)
    }

    /// Mark the connection as read-only (replica reads in cluster mode)
    fn readonly(&mut self) -> io::Result<()> {
        let reply = self.execute(&["READONLY"])?;
        expect_ok("READONLY", reply)
    }

    fn get(&mut self, key: &[u8]) -> io::Result<Option<Vec<u8>>> {
        match self.execute_binary(&[b"GET", key])? {
            RespValue::BulkString(data) => Ok(Some(data)),
            RespValue::Null => Ok(None),
            RespValue::Error(e) => Err(server_err(e)),
            other => Err(unexpected("GET", &other)),
        }
    }

    fn set(&mut self, key: &[u8], value: &[u8]) -> io::Result<()> {
        let reply = self.execute_binary(&[b"SET", key, value])?;
        expect_ok("SET", reply)
    }

    fn set_ex(&mut self, key: &[u8], seconds: u64, value: &[u8]) -> io::Result<()> {
        let secs = seconds.to_string();
        let reply = self.execute_binary(&[b"SETEX", key, secs.as_bytes(), value])?;
        expect_ok("SETEX", reply)
    }

    /// `SET key value NX EX seconds`; false when the key already exists
    fn set_nx_ex(&mut self, key: &[u8], seconds: u64, value: &[u8]) -> io::Result<bool> {
        let secs = seconds.to_string();
        match self.execute_binary(&[b"SET", key, value, b"NX", b"EX", secs.as_bytes()])? {
            RespValue::SimpleString(s) if s == "OK" => Ok(true),
            RespValue::Null => Ok(false),
            RespValue::Error(e) => Err(server_err(e)),
            other => Err(unexpected("SET NX", &other)),
        }
    }

    /// Delete one batch of keys; the caller is responsible for keeping
    /// the batch on a single node in cluster mode
    fn del(&mut self, keys: &[&[u8]]) -> io::Result<i64> {
        let mut args: Vec<&[u8]> = Vec::with_capacity(keys.len() + 1);
        args.push(b"DEL");
        args.extend_from_slice(keys);
        let reply = self.execute_binary(&args)?;
        expect_int("DEL", reply)
    }

    fn incr_by(&mut self, key: &[u8], delta: i64) -> io::Result<i64> {
        let delta_str = delta.to_string();
        let reply = self.execute_binary(&[b"INCRBY", key, delta_str.as_bytes()])?;
        expect_int("INCRBY", reply)
    }

    fn decr_by(&mut self, key: &[u8], delta: i64) -> io::Result<i64> {
        let delta_str = delta.to_string();
        let reply = self.execute_binary(&[b"DECRBY", key, delta_str.as_bytes()])?;
        expect_int("DECRBY", reply)
    }

    /// Remaining TTL in seconds; -1 = no expiration, -2 = missing key
    fn ttl(&mut self, key: &[u8]) -> io::Result<i64> {
        let reply = self.execute_binary(&[b"TTL", key])?;
        expect_int("TTL", reply)
    }

    /// One SCAN step against this node
    fn scan(&mut self, cursor: u64, pattern: &[u8], count: u32) -> io::Result<(u64, Vec<Vec<u8>>)> {
        let cursor_str = cursor.to_string();
        let count_str = count.to_string();
        let reply = self.execute_binary(&[
            b"SCAN",
            cursor_str.as_bytes(),
            b"MATCH",
            pattern,
            b"COUNT",
            count_str.as_bytes(),
        ])?;
        parse_scan_reply(&reply)
    }

    fn flush_all(&mut self) -> io::Result<()> {
        let reply = self.execute(&["FLUSHALL"])?;
        expect_ok("FLUSHALL", reply)
    }

    fn flush_db(&mut self) -> io::Result<()> {
        let reply = self.execute(&["FLUSHDB"])?;
        expect_ok("FLUSHDB", reply)
    }

    fn info(&mut self) -> io::Result<String> {
        let reply = self.execute(&["INFO"])?;
        expect_text("INFO", reply)
    }

    fn cluster_nodes(&mut self) -> io::Result<String> {
        let reply = self.execute(&["CLUSTER", "NODES"])?;
        expect_text("CLUSTER NODES", reply)
    }

    fn dbsize(&mut self) -> io::Result<i64> {
        let reply = self.execute(&["DBSIZE"])?;
        expect_int("DBSIZE", reply)
    }
}

// Blanket implementation: any Commands automatically gets the verbs
impl<T: Commands + ?Sized> CommandsExt for T {}


#[cfg(test)]
mod tests {
    use super::mock::MockCommands;
    use super::*;

    #[test]
    fn test_ping() {
        let mut mock = MockCommands::new(vec![RespValue::SimpleString("PONG".to_string())]);
        assert!(mock.ping().unwrap());
    }

    #[test]
    fn test_get_null_is_none() {
        let mut mock = MockCommands::new(vec![RespValue::Null]);
        assert_eq!(mock.get(b"missing").unwrap(), None);
    }

    #[test]
    fn test_del_returns_count() {
        let mut mock = MockCommands::new(vec![RespValue::Integer(2)]);
        assert_eq!(mock.del(&[b"a", b"b", b"c"]).unwrap(), 2);
        assert_eq!(mock.sent[0][0], b"DEL".to_vec());
        assert_eq!(mock.sent[0].len(), 4);
    }

    #[test]
    fn test_set_ex_encodes_seconds() {
        let mut mock = MockCommands::new(vec![RespValue::SimpleString("OK".to_string())]);
        mock.set_ex(b"k", 60, b"v").unwrap();
        assert_eq!(mock.sent[0][2], b"60".to_vec());
    }

    #[test]
    fn test_server_error_propagates() {
        let mut mock = MockCommands::new(vec![RespValue::Error("ERR bad".to_string())]);
        let err = mock.incr_by(b"k", 1).unwrap_err();
        assert_eq!(err.to_string(), "ERR bad");
    }

    #[test]
    fn test_parse_scan_reply_in_progress() {
        let reply = RespValue::Array(vec![
            RespValue::BulkString(b"42".to_vec()),
            RespValue::Array(vec![RespValue::BulkString(b"key_1".to_vec())]),
        ]);
        let (cursor, keys) = parse_scan_reply(&reply).unwrap();
        assert_eq!(cursor, 42);
        assert_eq!(keys, vec![b"key_1".to_vec()]);
    }

    #[test]
    fn test_parse_scan_reply_empty_batch_keeps_cursor() {
        // An empty batch mid-scan is NOT completion
        let reply = RespValue::Array(vec![
            RespValue::BulkString(b"17".to_vec()),
            RespValue::Array(vec![]),
        ]);
        let (cursor, keys) = parse_scan_reply(&reply).unwrap();
        assert_eq!(cursor, 17);
        assert!(keys.is_empty());
    }

    #[test]
    fn test_parse_scan_reply_complete() {
        let reply = RespValue::Array(vec![
            RespValue::BulkString(b"0".to_vec()),
            RespValue::Array(vec![RespValue::BulkString(b"last".to_vec())]),
        ]);
        let (cursor, keys) = parse_scan_reply(&reply).unwrap();
        assert_eq!(cursor, 0);
        assert_eq!(keys.len(), 1);
    }

    #[test]
    fn test_parse_scan_reply_rejects_malformed() {
        assert!(parse_scan_reply(&RespValue::Integer(0)).is_err());
    }

    #[test]
    fn test_transport_error_classification() {
        let eof = io::Error::new(io::ErrorKind::UnexpectedEof, "eof");
        assert!(is_transport_error(&eof));

        let server = io::Error::other("ERR bad");
        assert!(!is_transport_error(&server));
    }
}
