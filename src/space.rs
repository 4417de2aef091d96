//! The address space: a tree of containers and methods that routes
//! incoming messages to handlers via OSC pattern matching.
//!
//! The tree is arena-backed: nodes live in a slab indexed by
//! [`ElementId`], parents own their children, and the parent link on each
//! node is a plain index kept for lookups. Dispatch walks the tree with
//! an explicit stack, so arbitrarily deep trees cannot overflow the call
//! stack.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use log::{error, warn};

use crate::address::{
    contains_reserved_symbols, split_address, SegmentPattern,
};
use crate::errors::OscError;
use crate::event::Subscription;
use crate::receiver::OscReceiver;
use crate::types::{OscBundle, OscMessage, OscPacket, OscType, Result};

/// Handle to one element (container or method) of an address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementId(usize);

/// What an [`ElementId`] points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Container,
    Method,
}

/// A subscriber of a method: receives the matched leaf name and the
/// message arguments.
pub type MethodHandler = Arc<dyn Fn(&str, &[OscType]) + Send + Sync>;

enum NodeKind {
    Container { children: Vec<ElementId> },
    Method { handlers: Vec<MethodHandler> },
}

struct Node {
    name: String,
    parent: Option<ElementId>,
    kind: NodeKind,
}

struct Tree {
    nodes: Vec<Option<Node>>,
    free: Vec<usize>,
}

const ROOT: ElementId = ElementId(0);

impl Tree {
    fn new() -> Tree {
        Tree {
            nodes: vec![Some(Node {
                name: "root".to_string(),
                parent: None,
                kind: NodeKind::Container {
                    children: Vec::new(),
                },
            })],
            free: Vec::new(),
        }
    }

    fn node(&self, id: ElementId) -> Option<&Node> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    fn node_mut(&mut self, id: ElementId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0).and_then(Option::as_mut)
    }

    fn alloc(&mut self, node: Node) -> ElementId {
        match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = Some(node);
                ElementId(slot)
            }
            None => {
                self.nodes.push(Some(node));
                ElementId(self.nodes.len() - 1)
            }
        }
    }

    fn children(&self, id: ElementId) -> &[ElementId] {
        match self.node(id).map(|n| &n.kind) {
            Some(NodeKind::Container { children }) => children,
            _ => &[],
        }
    }

    fn find_child(&self, id: ElementId, name: &str) -> Option<ElementId> {
        self.children(id)
            .iter()
            .copied()
            .find(|child| self.node(*child).map(|n| n.name.as_str()) == Some(name))
    }

    /// Detach `id` from its parent and free its whole subtree.
    fn remove(&mut self, id: ElementId) -> Result<()> {
        if id == ROOT {
            return Err(OscError::BadAddress("the root cannot be removed".into()));
        }
        let parent = match self.node(id) {
            Some(node) => node.parent,
            None => return Err(OscError::MissingArg("element does not exist")),
        };
        if let Some(parent) = parent {
            if let Some(NodeKind::Container { children }) =
                self.node_mut(parent).map(|n| &mut n.kind)
            {
                children.retain(|child| *child != id);
            }
        }
        let mut worklist = vec![id];
        while let Some(current) = worklist.pop() {
            if let Some(node) = self.nodes[current.0].take() {
                if let NodeKind::Container { children } = node.kind {
                    worklist.extend(children);
                }
                self.free.push(current.0);
            }
        }
        Ok(())
    }

    fn address_of(&self, id: ElementId) -> Option<String> {
        let mut parts = Vec::new();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            if current == ROOT {
                break;
            }
            let node = self.node(current)?;
            parts.push(node.name.clone());
            cursor = node.parent;
        }
        parts.reverse();
        Some(format!("/{}", parts.join("/")))
    }
}

/// A hierarchical OSC address space rooted in a container named `"root"`.
pub struct AddressSpace {
    tree: Arc<Mutex<Tree>>,
    connections: Mutex<Vec<ReceiverConnection>>,
}

struct ReceiverConnection {
    key: usize,
    message_sub: Subscription,
    bundle_sub: Subscription,
}

fn receiver_key(receiver: &OscReceiver) -> usize {
    receiver.events() as *const _ as usize
}

impl Default for AddressSpace {
    fn default() -> Self {
        Self::new()
    }
}

impl AddressSpace {
    pub fn new() -> AddressSpace {
        AddressSpace {
            tree: Arc::new(Mutex::new(Tree::new())),
            connections: Mutex::new(Vec::new()),
        }
    }

    /// The root container.
    pub fn root(&self) -> ElementId {
        ROOT
    }

    /// Route a receiver's dispatched messages and bundles through this
    /// address space.
    pub fn connect(&self, receiver: &OscReceiver) {
        let key = receiver_key(receiver);
        let mut connections = self.connections.lock().unwrap();
        if connections.iter().any(|c| c.key == key) {
            return;
        }

        let message_sub = {
            let tree = Arc::clone(&self.tree);
            receiver
                .events()
                .message_received
                .subscribe(move |(message, _from)| dispatch_message(&tree, message))
        };
        let bundle_sub = {
            let tree = Arc::clone(&self.tree);
            receiver
                .events()
                .bundle_received
                .subscribe(move |(bundle, _from)| dispatch_bundle(&tree, bundle))
        };

        connections.push(ReceiverConnection {
            key,
            message_sub,
            bundle_sub,
        });
    }

    /// Stop routing the given receiver. Unknown receivers are a no-op.
    pub fn disconnect(&self, receiver: &OscReceiver) {
        let key = receiver_key(receiver);
        let mut connections = self.connections.lock().unwrap();
        if let Some(at) = connections.iter().position(|c| c.key == key) {
            let connection = connections.remove(at);
            receiver
                .events()
                .message_received
                .unsubscribe(connection.message_sub);
            receiver
                .events()
                .bundle_received
                .unsubscribe(connection.bundle_sub);
        }
    }

    /// Register `handler` under `address`, creating containers along the
    /// way. If a method already exists there the handler is appended to
    /// it. Fails if the terminal element is a container, or if any
    /// segment uses reserved symbols.
    pub fn add_method<F>(&self, address: &str, handler: F) -> Result<ElementId>
    where
        F: Fn(&str, &[OscType]) + Send + Sync + 'static,
    {
        let segments = checked_segments(address)?;
        let mut tree = self.tree.lock().unwrap();

        let (terminal, parent) = segments.split_last().expect("segments are never empty");
        let mut cursor = ROOT;
        for segment in parent {
            cursor = descend_container(&mut tree, cursor, segment)?;
        }

        match tree.find_child(cursor, terminal) {
            Some(existing) => match tree.node_mut(existing).map(|n| &mut n.kind) {
                Some(NodeKind::Method { handlers }) => {
                    handlers.push(Arc::new(handler));
                    Ok(existing)
                }
                _ => Err(OscError::BadAddress(format!(
                    "{} is already a container",
                    address
                ))),
            },
            None => {
                let method = tree.alloc(Node {
                    name: terminal.to_string(),
                    parent: Some(cursor),
                    kind: NodeKind::Method {
                        handlers: vec![Arc::new(handler)],
                    },
                });
                attach(&mut tree, cursor, method);
                Ok(method)
            }
        }
    }

    /// Find or create the container at `address`. Fails if any element on
    /// the way, or the terminal element itself, is a method.
    pub fn add_container(&self, address: &str) -> Result<ElementId> {
        let segments = checked_segments(address)?;
        let mut tree = self.tree.lock().unwrap();
        let mut cursor = ROOT;
        for segment in &segments {
            cursor = descend_container(&mut tree, cursor, segment)?;
        }
        Ok(cursor)
    }

    /// Remove an element and its whole subtree.
    pub fn remove_element(&self, id: ElementId) -> Result<()> {
        self.tree.lock().unwrap().remove(id)
    }

    /// Remove the element at a literal address.
    pub fn remove_element_by_address(&self, address: &str) -> Result<()> {
        let segments = split_address(address)?;
        let mut tree = self.tree.lock().unwrap();
        let mut cursor = ROOT;
        for segment in segments {
            cursor = tree
                .find_child(cursor, segment)
                .ok_or_else(|| OscError::BadAddress(format!("{} does not exist", address)))?;
        }
        tree.remove(cursor)
    }

    /// The first element whose address matches `pattern`.
    pub fn get_element_by_address(&self, pattern: &str) -> Result<Option<ElementId>> {
        Ok(self.collect_by_address(pattern, Some(1))?.into_iter().next())
    }

    /// Every element whose address matches `pattern`, in tree order.
    pub fn get_elements_by_address(&self, pattern: &str) -> Result<Vec<ElementId>> {
        self.collect_by_address(pattern, None)
    }

    /// The first element whose leaf name matches `name_pattern`,
    /// regardless of its path.
    pub fn get_element_by_name(&self, name_pattern: &str) -> Result<Option<ElementId>> {
        Ok(self.collect_by_name(name_pattern, Some(1))?.into_iter().next())
    }

    /// Every element whose leaf name matches `name_pattern`.
    pub fn get_elements_by_name(&self, name_pattern: &str) -> Result<Vec<ElementId>> {
        self.collect_by_name(name_pattern, None)
    }

    /// The element's kind, if it still exists.
    pub fn element_kind(&self, id: ElementId) -> Option<ElementKind> {
        match self.tree.lock().unwrap().node(id).map(|n| &n.kind) {
            Some(NodeKind::Container { .. }) => Some(ElementKind::Container),
            Some(NodeKind::Method { .. }) => Some(ElementKind::Method),
            None => None,
        }
    }

    /// The element's full address, if it still exists.
    pub fn address_of(&self, id: ElementId) -> Option<String> {
        self.tree.lock().unwrap().address_of(id)
    }

    /// Feed a decoded message straight into the dispatch walk, without
    /// going through a receiver.
    pub fn dispatch(&self, message: &OscMessage) {
        dispatch_message(&self.tree, message);
    }

    fn collect_by_address(&self, pattern: &str, limit: Option<usize>) -> Result<Vec<ElementId>> {
        let compiled = compile_pattern(pattern)?;
        let tree = self.tree.lock().unwrap();
        let mut found = Vec::new();

        // stack[d] = (container at depth d, next child index to look at)
        let mut stack: Vec<(ElementId, usize)> = vec![(ROOT, 0)];
        'walk: while let Some(&(container, cursor)) = stack.last() {
            let depth = stack.len() - 1;
            let terminal = depth + 1 == compiled.len();
            let children = tree.children(container);

            if cursor >= children.len() {
                stack.pop();
                continue;
            }
            *stack.last_mut().map(|(_, c)| c).expect("stack is non-empty") += 1;

            let child = children[cursor];
            let node = match tree.node(child) {
                Some(node) => node,
                None => continue,
            };
            if !compiled[depth].matches(&node.name) {
                continue;
            }
            if terminal {
                found.push(child);
                if limit.is_some_and(|limit| found.len() >= limit) {
                    break 'walk;
                }
            } else if matches!(node.kind, NodeKind::Container { .. }) {
                stack.push((child, 0));
            }
        }
        Ok(found)
    }

    fn collect_by_name(&self, name_pattern: &str, limit: Option<usize>) -> Result<Vec<ElementId>> {
        let pattern = SegmentPattern::new(name_pattern)?;
        let tree = self.tree.lock().unwrap();
        let mut found = Vec::new();

        let mut worklist = vec![ROOT];
        while let Some(current) = worklist.pop() {
            if current != ROOT {
                if let Some(node) = tree.node(current) {
                    if pattern.matches(&node.name) {
                        found.push(current);
                        if limit.is_some_and(|limit| found.len() >= limit) {
                            break;
                        }
                    }
                }
            }
            let children = tree.children(current);
            // Reverse push keeps depth-first tree order.
            for child in children.iter().rev() {
                worklist.push(*child);
            }
        }
        Ok(found)
    }
}

fn checked_segments(address: &str) -> Result<Vec<String>> {
    let segments = split_address(address)?;
    for segment in &segments {
        if contains_reserved_symbols(segment) {
            return Err(OscError::BadAddress(format!(
                "element {:?} contains reserved symbols",
                segment
            )));
        }
    }
    Ok(segments.into_iter().map(String::from).collect())
}

fn compile_pattern(pattern: &str) -> Result<Vec<SegmentPattern>> {
    split_address(pattern)?
        .into_iter()
        .map(SegmentPattern::new)
        .collect()
}

/// Find or create the container child `name` under `parent`.
fn descend_container(tree: &mut Tree, parent: ElementId, name: &str) -> Result<ElementId> {
    if let Some(existing) = tree.find_child(parent, name) {
        return match tree.node(existing).map(|n| &n.kind) {
            Some(NodeKind::Container { .. }) => Ok(existing),
            _ => Err(OscError::BadAddress(format!(
                "{:?} is already a method",
                name
            ))),
        };
    }
    let container = tree.alloc(Node {
        name: name.to_string(),
        parent: Some(parent),
        kind: NodeKind::Container {
            children: Vec::new(),
        },
    });
    attach(tree, parent, container);
    Ok(container)
}

fn attach(tree: &mut Tree, parent: ElementId, child: ElementId) {
    if let Some(NodeKind::Container { children }) = tree.node_mut(parent).map(|n| &mut n.kind) {
        children.push(child);
    }
}

fn dispatch_bundle(tree: &Mutex<Tree>, bundle: &OscBundle) {
    // Bundles may still nest here (time tags ignored): walk them with a
    // worklist, never recursion.
    let mut worklist: Vec<&OscPacket> = bundle.content.iter().rev().collect();
    while let Some(packet) = worklist.pop() {
        match packet {
            OscPacket::Message(message) => dispatch_message(tree, message),
            OscPacket::Bundle(nested) => {
                for child in nested.content.iter().rev() {
                    worklist.push(child);
                }
            }
        }
    }
}

fn dispatch_message(tree: &Mutex<Tree>, message: &OscMessage) {
    let compiled = match compile_pattern(&message.addr) {
        Ok(compiled) => compiled,
        Err(err) => {
            warn!("cannot dispatch {:?}: {}", message.addr, err);
            return;
        }
    };

    // Handlers run under the tree lock: dispatch across one address space
    // is serialized.
    let tree = tree.lock().unwrap();

    // stack[d] = (container at depth d, next child index at that depth)
    let mut stack: Vec<(ElementId, usize)> = vec![(ROOT, 0)];
    while let Some(&(container, cursor)) = stack.last() {
        let depth = stack.len() - 1;
        let segment = &compiled[depth];
        let terminal = depth + 1 == compiled.len();

        if terminal {
            // Fire every matching method of this container, in child
            // order, then resume one level up.
            for child in tree.children(container) {
                if let Some(node) = tree.node(*child) {
                    if let NodeKind::Method { handlers } = &node.kind {
                        if segment.matches(&node.name) {
                            invoke(handlers, &node.name, &message.args);
                        }
                    }
                }
            }
            stack.pop();
            continue;
        }

        let children = tree.children(container);

        // Literal segments jump straight to the named child.
        if cursor == 0 {
            if let Some(literal) = segment.as_literal() {
                stack.last_mut().expect("stack is non-empty").1 = children.len();
                match tree.find_child(container, literal) {
                    Some(child)
                        if matches!(
                            tree.node(child).map(|n| &n.kind),
                            Some(NodeKind::Container { .. })
                        ) =>
                    {
                        stack.push((child, 0));
                    }
                    _ => {
                        stack.pop();
                    }
                }
                continue;
            }
        }

        if cursor >= children.len() {
            stack.pop();
            continue;
        }
        // Remember where to resume before descending.
        stack.last_mut().expect("stack is non-empty").1 = cursor + 1;

        let child = children[cursor];
        if let Some(node) = tree.node(child) {
            if matches!(node.kind, NodeKind::Container { .. }) && segment.matches(&node.name) {
                stack.push((child, 0));
            }
        }
    }
}

fn invoke(handlers: &[MethodHandler], leaf_name: &str, args: &[OscType]) {
    for handler in handlers {
        let handler = Arc::clone(handler);
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| handler(leaf_name, args))) {
            error!(
                "handler of {:?} panicked: {}",
                leaf_name,
                crate::event::panic_message(payload)
            );
        }
    }
}
