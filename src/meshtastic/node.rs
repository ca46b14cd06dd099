//! Known peers on the mesh.
//!
//! The radio pushes its node database during the config handshake and later
//! NODEINFO packets refresh it. Order is preserved as received so the node
//! listing matches what the radio reported.
use crate::protobuf::meshtastic_generated as proto;
use serde::Serialize;

/// Destination address meaning "everyone on the channel".
pub const BROADCAST_ADDR: u32 = 0xFFFF_FFFF;
/// Display name used whenever a node has not told us its short name.
pub const UNKNOWN_NAME: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Node {
    pub num: u32,
    pub user_id: String,
    pub short_name: String,
    pub long_name: String,
}

impl Node {
    pub fn new(num: u32, short_name: &str, long_name: &str) -> Self {
        Self {
            num,
            user_id: format_node_id(num),
            short_name: short_name.trim().to_string(),
            long_name: long_name.trim().to_string(),
        }
    }

    pub fn from_proto(info: &proto::NodeInfo) -> Self {
        match &info.user {
            Some(user) => Self::from_user(info.num, user),
            None => Self::new(info.num, "", ""),
        }
    }

    pub fn from_user(num: u32, user: &proto::User) -> Self {
        let mut node = Self::new(num, &user.short_name, &user.long_name);
        if !user.id.trim().is_empty() {
            node.user_id = user.id.trim().to_string();
        }
        node
    }

    /// Short name, or [`UNKNOWN_NAME`] when the node never sent one.
    pub fn display_short(&self) -> &str {
        if self.short_name.is_empty() {
            UNKNOWN_NAME
        } else {
            &self.short_name
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct NodeDb {
    nodes: Vec<Node>,
}

impl NodeDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or refresh a node. A refresh without names keeps the names we already know.
    pub fn upsert(&mut self, node: Node) {
        match self.nodes.iter_mut().find(|n| n.num == node.num) {
            Some(existing) => {
                if !node.short_name.is_empty() {
                    existing.short_name = node.short_name;
                }
                if !node.long_name.is_empty() {
                    existing.long_name = node.long_name;
                }
                existing.user_id = node.user_id;
            }
            None => self.nodes.push(node),
        }
    }

    pub fn get(&self, num: u32) -> Option<&Node> {
        self.nodes.iter().find(|n| n.num == num)
    }

    pub fn short_name(&self, num: u32) -> &str {
        self.get(num).map(Node::display_short).unwrap_or(UNKNOWN_NAME)
    }

    /// Find a node by its `!xxxxxxxx` id.
    pub fn lookup(&self, id: &str) -> Option<&Node> {
        parse_node_id(id).and_then(|num| self.get(num))
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Node> {
        self.nodes.iter()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// `!` followed by eight lower-case hex digits; `^all` for the broadcast address.
pub fn format_node_id(num: u32) -> String {
    if num == BROADCAST_ADDR {
        "^all".to_string()
    } else {
        format!("!{:08x}", num)
    }
}

/// Parse `!1a2b3c4d` style ids (1 to 8 hex digits, any case) or `^all`.
pub fn parse_node_id(id: &str) -> Option<u32> {
    let id = id.trim();
    if id.eq_ignore_ascii_case("^all") {
        return Some(BROADCAST_ADDR);
    }
    let hex = id.strip_prefix('!')?;
    if hex.is_empty() || hex.len() > 8 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    u32::from_str_radix(hex, 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_ids_round_trip() {
        assert_eq!(format_node_id(0xa1b2c3d4), "!a1b2c3d4");
        assert_eq!(format_node_id(0x1f), "!0000001f");
        assert_eq!(parse_node_id("!A1B2C3D4"), Some(0xa1b2c3d4));
        assert_eq!(parse_node_id("!1f"), Some(0x1f));
        assert_eq!(parse_node_id("^all"), Some(BROADCAST_ADDR));
        assert_eq!(format_node_id(BROADCAST_ADDR), "^all");
    }

    #[test]
    fn malformed_ids_are_rejected() {
        for bad in ["", "!", "a1b2c3d4", "!xyz", "!123456789", "! 12"] {
            assert_eq!(parse_node_id(bad), None, "{bad:?} should not parse");
        }
    }

    #[test]
    fn upsert_keeps_known_names() {
        let mut db = NodeDb::new();
        db.upsert(Node::new(1, "AB", "Alpha Bravo"));
        db.upsert(Node::new(2, "CD", "Charlie Delta"));
        db.upsert(Node::new(1, "", ""));
        assert_eq!(db.len(), 2);
        assert_eq!(db.short_name(1), "AB");
        db.upsert(Node::new(1, "AX", ""));
        assert_eq!(db.short_name(1), "AX");
        assert_eq!(db.get(1).map(|n| n.long_name.as_str()), Some("Alpha Bravo"));
        let order: Vec<u32> = db.iter().map(|n| n.num).collect();
        assert_eq!(order, vec![1, 2]);
    }

    #[test]
    fn unknown_nodes_fall_back() {
        let mut db = NodeDb::new();
        assert_eq!(db.short_name(42), UNKNOWN_NAME);
        db.upsert(Node::new(42, "  ", "Nameless"));
        assert_eq!(db.short_name(42), UNKNOWN_NAME);
        assert!(db.lookup("!0000002a").is_some());
    }

    #[test]
    fn serializes_for_json_listing() {
        let json = serde_json::to_value(Node::new(0x2a, "AB", "Alpha")).unwrap();
        assert_eq!(json["user_id"], "!0000002a");
        assert_eq!(json["num"], 42);
        assert_eq!(json["short_name"], "AB");
    }

    #[test]
    fn proto_user_id_is_preferred() {
        let info = proto::NodeInfo {
            num: 0x10,
            user: Some(proto::User {
                id: "!00000010".into(),
                long_name: "Base".into(),
                short_name: "BS".into(),
                ..Default::default()
            }),
            ..Default::default()
        };
        let node = Node::from_proto(&info);
        assert_eq!(node.user_id, "!00000010");
        assert_eq!(node.display_short(), "BS");
    }
}
