use std::collections::HashSet;

use crate::cryptor::CipherKind;
use crate::error::{Error, Result};
use crate::ids::NodeId;
use crate::time::{self, Timestamp};

/// Root of a vault tree. Distinct from [`Node`] so "the root is a Cabinet"
/// holds by construction; it additionally carries the vault password and a
/// marker recording which cipher the document was last decrypted with.
#[derive(Clone, Debug)]
pub struct Cabinet {
    id: NodeId,
    created: Timestamp,
    modified: Timestamp,
    label: String,
    password: String,
    cipher: CipherKind,
    dirty: bool,
    children: Vec<Node>,
}

/// Interior or leaf member of a vault tree. The child list exclusively owns
/// its elements; moving a node between parents is an extract plus a graft,
/// never aliasing.
#[derive(Clone, Debug)]
pub struct Node {
    id: NodeId,
    created: Timestamp,
    modified: Timestamp,
    label: String,
    dirty: bool,
    kind: NodeKind,
}

/// Closed set of non-root node kinds. Folders hold folders and cards, cards
/// hold entries, entries are leaves carrying a content string.
#[derive(Clone, Debug)]
pub enum NodeKind {
    Folder { children: Vec<Node> },
    Card { children: Vec<Node> },
    SingleLineEntry { content: String },
    MultiLineEntry { content: String },
}

impl NodeKind {
    pub fn kind_name(&self) -> &'static str {
        match self {
            NodeKind::Folder { .. } => "Folder",
            NodeKind::Card { .. } => "Card",
            NodeKind::SingleLineEntry { .. } => "SingleLineEntry",
            NodeKind::MultiLineEntry { .. } => "MultiLineEntry",
        }
    }

    fn children(&self) -> &[Node] {
        match self {
            NodeKind::Folder { children } | NodeKind::Card { children } => children,
            NodeKind::SingleLineEntry { .. } | NodeKind::MultiLineEntry { .. } => &[],
        }
    }

    pub(crate) fn children_mut(&mut self) -> Option<&mut Vec<Node>> {
        match self {
            NodeKind::Folder { children } | NodeKind::Card { children } => Some(children),
            NodeKind::SingleLineEntry { .. } | NodeKind::MultiLineEntry { .. } => None,
        }
    }
}

fn validate_times(created: Timestamp, modified: Timestamp, what: &str) -> Result<()> {
    if modified < created {
        return Err(Error::InvalidStructure(format!(
            "{what}: modified time {} precedes creation time {}",
            time::format(modified),
            time::format(created)
        )));
    }
    Ok(())
}

fn insert_into(children: &mut Vec<Node>, node: Node, index: Option<usize>) -> Result<()> {
    if children.iter().any(|c| c.id == node.id) {
        return Err(Error::InvalidStructure(format!(
            "duplicate child id {}",
            node.id
        )));
    }
    let idx = index.unwrap_or(children.len()).min(children.len());
    children.insert(idx, node);
    Ok(())
}

fn normalize_multiline(content: &str) -> String {
    content.replace("\r\n", "\n")
}

impl Cabinet {
    /// Fresh cabinet with a generated id; starts dirty like every new node.
    pub fn new(label: impl Into<String>, password: impl Into<String>) -> Self {
        let now = time::now();
        Self {
            id: NodeId::generate(),
            created: now,
            modified: now,
            label: label.into(),
            password: password.into(),
            cipher: CipherKind::Current,
            dirty: true,
            children: Vec::new(),
        }
    }

    /// Re-construct a cabinet from persisted parts; starts clean.
    pub fn restore(
        id: NodeId,
        created: Timestamp,
        modified: Timestamp,
        label: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self> {
        validate_times(created, modified, "Cabinet")?;
        Ok(Self {
            id,
            created,
            modified,
            label: label.into(),
            password: password.into(),
            cipher: CipherKind::Current,
            dirty: false,
            children: Vec::new(),
        })
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn created(&self) -> Timestamp {
        self.created
    }

    pub fn modified(&self) -> Timestamp {
        self.modified
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    /// Cipher the vault document was last decrypted with. Runtime state only,
    /// never persisted; saving always re-encodes under the current cipher.
    pub fn cipher(&self) -> CipherKind {
        self.cipher
    }

    pub fn set_cipher(&mut self, cipher: CipherKind) {
        self.cipher = cipher;
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    /// Mutable access to the children for field edits; structural changes go
    /// through [`Cabinet::add_child`] and friends so the containment rules
    /// cannot be bypassed.
    pub fn children_mut(&mut self) -> &mut [Node] {
        &mut self.children
    }

    pub(crate) fn children_vec(&mut self) -> &mut Vec<Node> {
        &mut self.children
    }

    pub fn set_label(&mut self, label: impl Into<String>) {
        let label = label.into();
        if self.label != label {
            self.label = label;
            self.touch();
        }
    }

    pub fn set_password(&mut self, password: impl Into<String>) {
        let password = password.into();
        if self.password != password {
            self.password = password;
            self.touch();
        }
    }

    pub(crate) fn set_label_quiet(&mut self, label: String) {
        self.label = label;
    }

    pub(crate) fn set_password_quiet(&mut self, password: String) {
        self.password = password;
    }

    pub(crate) fn set_modified(&mut self, modified: Timestamp) {
        self.modified = modified;
    }

    /// Insert a child folder at the end of the child list, marking the tree
    /// modified. Only folders may live directly under the root.
    pub fn add_child(&mut self, node: Node) -> Result<()> {
        self.attach(node, None, true)
    }

    pub fn add_child_at(&mut self, node: Node, index: usize) -> Result<()> {
        self.attach(node, Some(index), true)
    }

    /// Quiet insert used when re-assembling a tree (decode, merge, fixtures):
    /// no timestamp bump, no dirty mark.
    pub fn graft_child(&mut self, node: Node) -> Result<()> {
        self.attach(node, None, false)
    }

    pub fn graft_child_at(&mut self, node: Node, index: usize) -> Result<()> {
        self.attach(node, Some(index), false)
    }

    fn attach(&mut self, node: Node, index: Option<usize>, mark: bool) -> Result<()> {
        match node.kind {
            NodeKind::Folder { .. } => {}
            ref other => {
                return Err(Error::InvalidStructure(format!(
                    "a Cabinet cannot contain a {}",
                    other.kind_name()
                )));
            }
        }
        insert_into(&mut self.children, node, index)?;
        if mark {
            self.touch();
        }
        Ok(())
    }

    pub fn remove_child(&mut self, id: &NodeId) -> Option<Node> {
        let removed = self.extract_child(id);
        if removed.is_some() {
            self.touch();
        }
        removed
    }

    /// Quiet removal: the counterpart of [`Cabinet::graft_child`].
    pub fn extract_child(&mut self, id: &NodeId) -> Option<Node> {
        let pos = self.children.iter().position(|c| &c.id == id)?;
        Some(self.children.remove(pos))
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// A cabinet reports dirty when any node in the tree is dirty, which
    /// preserves the "every mutation dirties the root" contract without
    /// parent pointers.
    pub fn is_dirty(&self) -> bool {
        self.dirty || self.children.iter().any(Node::is_dirty)
    }

    pub fn clear_dirty(&mut self) {
        self.dirty = false;
        for child in &mut self.children {
            child.clear_dirty();
        }
    }

    fn touch(&mut self) {
        self.modified = time::now();
        self.dirty = true;
    }

    /// Structural equality: ids, timestamps, labels, password, content, and
    /// child order throughout the tree. Dirty bits and the cipher marker are
    /// runtime state and do not participate.
    pub fn structural_eq(&self, other: &Cabinet) -> bool {
        self.id == other.id
            && self.created == other.created
            && self.modified == other.modified
            && self.label == other.label
            && self.password == other.password
            && self.children.len() == other.children.len()
            && self
                .children
                .iter()
                .zip(&other.children)
                .all(|(a, b)| a.structural_eq(b))
    }

    /// Validate id uniqueness, timestamp ordering, and containment across the
    /// whole tree. Intended for tests and debugging.
    pub fn validate_invariants(&self) -> Result<()> {
        validate_times(self.created, self.modified, "Cabinet")?;
        let mut seen = HashSet::new();
        seen.insert(self.id.clone());
        for child in &self.children {
            match child.kind {
                NodeKind::Folder { .. } => {}
                ref other => {
                    return Err(Error::InvalidStructure(format!(
                        "a Cabinet cannot contain a {}",
                        other.kind_name()
                    )));
                }
            }
            child.validate_into(&mut seen)?;
        }
        Ok(())
    }
}

impl Node {
    pub fn folder(label: impl Into<String>) -> Self {
        Self::fresh(label.into(), NodeKind::Folder { children: Vec::new() })
    }

    pub fn card(label: impl Into<String>) -> Self {
        Self::fresh(label.into(), NodeKind::Card { children: Vec::new() })
    }

    pub fn single_line(label: impl Into<String>, content: impl Into<String>) -> Self {
        Self::fresh(
            label.into(),
            NodeKind::SingleLineEntry {
                content: content.into(),
            },
        )
    }

    pub fn multi_line(label: impl Into<String>, content: impl Into<String>) -> Self {
        Self::fresh(
            label.into(),
            NodeKind::MultiLineEntry {
                content: normalize_multiline(&content.into()),
            },
        )
    }

    fn fresh(label: String, kind: NodeKind) -> Self {
        let now = time::now();
        Self {
            id: NodeId::generate(),
            created: now,
            modified: now,
            label,
            dirty: true,
            kind,
        }
    }

    pub fn restore_folder(
        id: NodeId,
        created: Timestamp,
        modified: Timestamp,
        label: impl Into<String>,
    ) -> Result<Self> {
        Self::restore(id, created, modified, label.into(), NodeKind::Folder { children: Vec::new() })
    }

    pub fn restore_card(
        id: NodeId,
        created: Timestamp,
        modified: Timestamp,
        label: impl Into<String>,
    ) -> Result<Self> {
        Self::restore(id, created, modified, label.into(), NodeKind::Card { children: Vec::new() })
    }

    pub fn restore_single_line(
        id: NodeId,
        created: Timestamp,
        modified: Timestamp,
        label: impl Into<String>,
        content: impl Into<String>,
    ) -> Result<Self> {
        Self::restore(
            id,
            created,
            modified,
            label.into(),
            NodeKind::SingleLineEntry {
                content: content.into(),
            },
        )
    }

    pub fn restore_multi_line(
        id: NodeId,
        created: Timestamp,
        modified: Timestamp,
        label: impl Into<String>,
        content: impl Into<String>,
    ) -> Result<Self> {
        Self::restore(
            id,
            created,
            modified,
            label.into(),
            NodeKind::MultiLineEntry {
                content: normalize_multiline(&content.into()),
            },
        )
    }

    fn restore(
        id: NodeId,
        created: Timestamp,
        modified: Timestamp,
        label: String,
        kind: NodeKind,
    ) -> Result<Self> {
        validate_times(created, modified, kind.kind_name())?;
        Ok(Self {
            id,
            created,
            modified,
            label,
            dirty: false,
            kind,
        })
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn created(&self) -> Timestamp {
        self.created
    }

    pub fn modified(&self) -> Timestamp {
        self.modified
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Entry content; `None` for container kinds.
    pub fn content(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::SingleLineEntry { content } | NodeKind::MultiLineEntry { content } => {
                Some(content)
            }
            NodeKind::Folder { .. } | NodeKind::Card { .. } => None,
        }
    }

    pub fn children(&self) -> &[Node] {
        self.kind.children()
    }

    /// Mutable access to the children for field edits; structural changes go
    /// through [`Node::add_child`] and friends.
    pub fn children_mut(&mut self) -> &mut [Node] {
        match &mut self.kind {
            NodeKind::Folder { children } | NodeKind::Card { children } => children,
            NodeKind::SingleLineEntry { .. } | NodeKind::MultiLineEntry { .. } => &mut [],
        }
    }

    pub(crate) fn kind_mut(&mut self) -> &mut NodeKind {
        &mut self.kind
    }

    pub fn set_label(&mut self, label: impl Into<String>) {
        let label = label.into();
        if self.label != label {
            self.label = label;
            self.touch();
        }
    }

    /// Replace an entry's content; fails on container kinds. Multi-line
    /// content is normalized to `\n` line endings.
    pub fn set_content(&mut self, content: impl Into<String>) -> Result<()> {
        let value = content.into();
        match &mut self.kind {
            NodeKind::SingleLineEntry { content } => {
                if *content != value {
                    *content = value;
                    self.touch();
                }
                Ok(())
            }
            NodeKind::MultiLineEntry { content } => {
                let value = normalize_multiline(&value);
                if *content != value {
                    *content = value;
                    self.touch();
                }
                Ok(())
            }
            NodeKind::Folder { .. } | NodeKind::Card { .. } => Err(Error::InvalidStructure(
                format!("a {} carries no content", self.kind.kind_name()),
            )),
        }
    }

    pub(crate) fn set_label_quiet(&mut self, label: String) {
        self.label = label;
    }

    pub(crate) fn set_content_quiet(&mut self, value: String) {
        match &mut self.kind {
            NodeKind::SingleLineEntry { content } | NodeKind::MultiLineEntry { content } => {
                *content = value;
            }
            NodeKind::Folder { .. } | NodeKind::Card { .. } => {}
        }
    }

    pub(crate) fn set_modified(&mut self, modified: Timestamp) {
        self.modified = modified;
    }

    pub fn add_child(&mut self, node: Node) -> Result<()> {
        self.attach(node, None, true)
    }

    pub fn add_child_at(&mut self, node: Node, index: usize) -> Result<()> {
        self.attach(node, Some(index), true)
    }

    /// Quiet insert: no timestamp bump, no dirty mark. See
    /// [`Cabinet::graft_child`].
    pub fn graft_child(&mut self, node: Node) -> Result<()> {
        self.attach(node, None, false)
    }

    pub fn graft_child_at(&mut self, node: Node, index: usize) -> Result<()> {
        self.attach(node, Some(index), false)
    }

    fn attach(&mut self, node: Node, index: Option<usize>, mark: bool) -> Result<()> {
        let parent_kind = self.kind.kind_name();
        match &mut self.kind {
            NodeKind::Folder { children } => {
                match node.kind {
                    NodeKind::Folder { .. } | NodeKind::Card { .. } => {}
                    ref other => {
                        return Err(Error::InvalidStructure(format!(
                            "a Folder cannot contain a {}",
                            other.kind_name()
                        )));
                    }
                }
                insert_into(children, node, index)?;
            }
            NodeKind::Card { children } => {
                match node.kind {
                    NodeKind::SingleLineEntry { .. } | NodeKind::MultiLineEntry { .. } => {}
                    ref other => {
                        return Err(Error::InvalidStructure(format!(
                            "a Card cannot contain a {}",
                            other.kind_name()
                        )));
                    }
                }
                insert_into(children, node, index)?;
            }
            NodeKind::SingleLineEntry { .. } | NodeKind::MultiLineEntry { .. } => {
                return Err(Error::InvalidStructure(format!(
                    "a {parent_kind} cannot contain children"
                )));
            }
        }
        if mark {
            self.touch();
        }
        Ok(())
    }

    pub fn remove_child(&mut self, id: &NodeId) -> Option<Node> {
        let removed = self.extract_child(id);
        if removed.is_some() {
            self.touch();
        }
        removed
    }

    pub fn remove_child_at(&mut self, index: usize) -> Option<Node> {
        let id = self.children().get(index)?.id.clone();
        self.remove_child(&id)
    }

    pub fn extract_child(&mut self, id: &NodeId) -> Option<Node> {
        let children = self.kind.children_mut()?;
        let pos = children.iter().position(|c| &c.id == id)?;
        Some(children.remove(pos))
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty || self.children().iter().any(Node::is_dirty)
    }

    pub fn clear_dirty(&mut self) {
        self.dirty = false;
        if let Some(children) = self.kind.children_mut() {
            for child in children {
                child.clear_dirty();
            }
        }
    }

    fn touch(&mut self) {
        self.modified = time::now();
        self.dirty = true;
    }

    pub fn structural_eq(&self, other: &Node) -> bool {
        if self.id != other.id
            || self.created != other.created
            || self.modified != other.modified
            || self.label != other.label
        {
            return false;
        }
        match (&self.kind, &other.kind) {
            (NodeKind::Folder { children: a }, NodeKind::Folder { children: b })
            | (NodeKind::Card { children: a }, NodeKind::Card { children: b }) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.structural_eq(y))
            }
            (
                NodeKind::SingleLineEntry { content: a },
                NodeKind::SingleLineEntry { content: b },
            )
            | (NodeKind::MultiLineEntry { content: a }, NodeKind::MultiLineEntry { content: b }) => {
                a == b
            }
            _ => false,
        }
    }

    fn validate_into(&self, seen: &mut HashSet<NodeId>) -> Result<()> {
        validate_times(self.created, self.modified, self.kind.kind_name())?;
        if !seen.insert(self.id.clone()) {
            return Err(Error::InvalidStructure(format!(
                "duplicate id {} in tree",
                self.id
            )));
        }
        let parent_kind = self.kind.kind_name();
        for child in self.children() {
            let allowed = match &self.kind {
                NodeKind::Folder { .. } => {
                    matches!(child.kind, NodeKind::Folder { .. } | NodeKind::Card { .. })
                }
                NodeKind::Card { .. } => matches!(
                    child.kind,
                    NodeKind::SingleLineEntry { .. } | NodeKind::MultiLineEntry { .. }
                ),
                NodeKind::SingleLineEntry { .. } | NodeKind::MultiLineEntry { .. } => false,
            };
            if !allowed {
                return Err(Error::InvalidStructure(format!(
                    "a {parent_kind} cannot contain a {}",
                    child.kind.kind_name()
                )));
            }
            child.validate_into(seen)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::from_unix;

    #[test]
    fn containment_rules_are_enforced() {
        let mut cabinet = Cabinet::new("Wallet", "");
        assert!(cabinet.add_child(Node::folder("Bank")).is_ok());
        assert!(matches!(
            cabinet.add_child(Node::card("Chase")),
            Err(Error::InvalidStructure(_))
        ));

        let mut folder = Node::folder("Bank");
        assert!(folder.add_child(Node::card("Chase")).is_ok());
        assert!(matches!(
            folder.add_child(Node::single_line("User", "me")),
            Err(Error::InvalidStructure(_))
        ));

        let mut card = Node::card("Chase");
        assert!(card.add_child(Node::multi_line("Notes", "a\nb")).is_ok());
        assert!(matches!(
            card.add_child(Node::folder("Nested")),
            Err(Error::InvalidStructure(_))
        ));

        let mut entry = Node::single_line("User", "me");
        assert!(matches!(
            entry.add_child(Node::single_line("Other", "x")),
            Err(Error::InvalidStructure(_))
        ));
    }

    #[test]
    fn duplicate_sibling_ids_are_rejected() {
        let mut folder = Node::folder("Bank");
        let card = Node::card("Chase");
        let twin = card.clone();
        folder.add_child(card).unwrap();
        assert!(matches!(
            folder.add_child(twin),
            Err(Error::InvalidStructure(_))
        ));
    }

    #[test]
    fn clone_preserves_ids_and_is_independent() {
        let mut cabinet = Cabinet::new("Wallet", "abcd1234");
        let mut folder = Node::folder("Bank");
        folder.add_child(Node::card("Chase")).unwrap();
        let folder_id = folder.id().clone();
        cabinet.add_child(folder).unwrap();

        let mut copy = cabinet.clone();
        assert!(copy.structural_eq(&cabinet));
        assert_eq!(copy.children()[0].id(), &folder_id);

        // mutating the copy leaves the original alone
        copy.children_mut()[0].set_label("Renamed");
        assert_eq!(cabinet.children()[0].label(), "Bank");
    }

    #[test]
    fn mutation_dirties_the_root() {
        let mut cabinet = Cabinet::new("Wallet", "");
        let mut folder = Node::folder("Bank");
        folder.add_child(Node::card("Chase")).unwrap();
        cabinet.add_child(folder).unwrap();
        cabinet.clear_dirty();
        assert!(!cabinet.is_dirty());

        let card_id = cabinet.children()[0].children()[0].id().clone();
        cabinet.children_mut()[0]
            .remove_child(&card_id)
            .expect("card present");
        assert!(cabinet.is_dirty());
    }

    #[test]
    fn graft_does_not_dirty_or_touch() {
        let mut cabinet = Cabinet::restore(
            NodeId::new("cab"),
            from_unix(100),
            from_unix(100),
            "Wallet",
            "",
        )
        .unwrap();
        let folder =
            Node::restore_folder(NodeId::new("f1"), from_unix(100), from_unix(100), "Bank")
                .unwrap();
        cabinet.graft_child(folder).unwrap();
        assert!(!cabinet.is_dirty());
        assert_eq!(cabinet.modified(), from_unix(100));
    }

    #[test]
    fn set_content_rejects_containers_and_normalizes_multiline() {
        let mut folder = Node::folder("Bank");
        assert!(folder.set_content("nope").is_err());

        let mut entry = Node::multi_line("Notes", "a\r\nb");
        assert_eq!(entry.content(), Some("a\nb"));
        entry.clear_dirty();
        entry.set_content("a\r\nc").unwrap();
        assert_eq!(entry.content(), Some("a\nc"));
        assert!(entry.is_dirty());
    }

    #[test]
    fn restore_rejects_modified_before_created() {
        let err = Node::restore_folder(NodeId::new("f"), from_unix(200), from_unix(100), "Bank");
        assert!(matches!(err, Err(Error::InvalidStructure(_))));
    }

    #[test]
    fn validate_invariants_catches_duplicate_ids_across_levels() {
        let mut cabinet = Cabinet::new("Wallet", "");
        let mut folder = Node::folder("Bank");
        let card =
            Node::restore_card(NodeId::new("dup"), from_unix(1), from_unix(1), "Chase").unwrap();
        folder.add_child(card).unwrap();
        let mut other = Node::folder("Work");
        let clash =
            Node::restore_card(NodeId::new("dup"), from_unix(1), from_unix(1), "Badge").unwrap();
        other.add_child(clash).unwrap();
        cabinet.add_child(folder).unwrap();
        cabinet.add_child(other).unwrap();
        assert!(matches!(
            cabinet.validate_invariants(),
            Err(Error::InvalidStructure(_))
        ));
    }
}
