// src/socket/patterns/trie.rs

use std::collections::BTreeMap;
use std::mem;

/// A node in the subscription trie.
///
/// Edges are compressed: `label` holds every byte between the parent and
/// this node, so a long topic costs one node. Children are keyed by the
/// first byte of their label.
#[derive(Debug, Default)]
struct TrieNode {
  label: Vec<u8>,
  children: BTreeMap<u8, TrieNode>,
  /// Number of subscriptions ending exactly at this node.
  count: usize,
}

impl TrieNode {
  fn leaf(label: &[u8]) -> Self {
    Self {
      label: label.to_vec(),
      children: BTreeMap::new(),
      count: 0,
    }
  }

  /// Splits this node's label at `at`. The tail moves into a new child that
  /// takes over the count and children.
  fn split(&mut self, at: usize) {
    let tail = TrieNode {
      label: self.label.split_off(at),
      children: mem::take(&mut self.children),
      count: mem::replace(&mut self.count, 0),
    };
    self.children.insert(tail.label[0], tail);
  }

  /// Folds the only child into this node.
  fn merge_only_child(&mut self) {
    if let Some((_, mut child)) = mem::take(&mut self.children).pop_first() {
      self.label.extend_from_slice(&child.label);
      self.count = child.count;
      self.children = mem::take(&mut child.children);
    }
  }
}

// Subtrees are torn down level by level; a derived drop would recurse once
// per node on the path.
impl Drop for TrieNode {
  fn drop(&mut self) {
    let mut pending: Vec<TrieNode> = mem::take(&mut self.children).into_values().collect();
    while let Some(mut node) = pending.pop() {
      pending.extend(mem::take(&mut node.children).into_values());
    }
  }
}

fn node_at_mut<'a>(mut node: &'a mut TrieNode, keys: &[u8]) -> Option<&'a mut TrieNode> {
  for key in keys {
    node = node.children.get_mut(key)?;
  }
  Some(node)
}

/// Multiset of topic prefixes with prefix matching.
///
/// Subscribing to a topic twice requires unsubscribing twice. The empty
/// topic matches every message.
#[derive(Debug, Default)]
pub(crate) struct SubscriptionTrie {
  root: TrieNode,
  /// Distinct topics currently present.
  distinct: usize,
}

impl SubscriptionTrie {
  pub fn new() -> Self {
    Self::default()
  }

  /// Adds a subscription topic (prefix).
  /// Returns true if the topic was not present before.
  pub fn subscribe(&mut self, topic: &[u8]) -> bool {
    let mut node = &mut self.root;
    let mut rest = topic;
    while let Some(&first) = rest.first() {
      let child = node
        .children
        .entry(first)
        .or_insert_with(|| TrieNode::leaf(rest));
      let common = child
        .label
        .iter()
        .zip(rest)
        .take_while(|(a, b)| a == b)
        .count();
      if common < child.label.len() {
        child.split(common);
      }
      rest = &rest[common..];
      node = child;
    }
    node.count += 1;
    let is_new = node.count == 1;
    if is_new {
      self.distinct += 1;
    }
    tracing::trace!(topic_len = topic.len(), count = node.count, "Subscribed");
    is_new
  }

  /// Removes one reference to a subscription topic.
  /// Returns true if the topic existed and its count reached zero.
  /// Removing a topic that is not subscribed is a no-op.
  pub fn unsubscribe(&mut self, topic: &[u8]) -> bool {
    match self.remove(topic) {
      Some(true) => {
        self.distinct -= 1;
        tracing::trace!(topic_len = topic.len(), "Unsubscribed (last reference)");
        true
      }
      Some(false) => {
        tracing::trace!(topic_len = topic.len(), "Unsubscribed (references remain)");
        false
      }
      None => {
        tracing::trace!(topic_len = topic.len(), "Unsubscribe ignored: topic not subscribed");
        false
      }
    }
  }

  /// `None` if `topic` is not subscribed, otherwise whether the last
  /// reference went away. Emptied nodes are pruned and single-child chains
  /// merged back.
  fn remove(&mut self, topic: &[u8]) -> Option<bool> {
    // First byte of each label on the path from the root.
    let mut keys = Vec::new();
    let mut node = &mut self.root;
    let mut rest = topic;
    while let Some(&first) = rest.first() {
      let child = node.children.get_mut(&first)?;
      if !rest.starts_with(&child.label) {
        return None;
      }
      rest = &rest[child.label.len()..];
      keys.push(first);
      node = child;
    }
    if node.count == 0 {
      return None;
    }
    node.count -= 1;
    if node.count > 0 {
      return Some(false);
    }

    let Some((&last, parent_keys)) = keys.split_last() else {
      // The empty topic lives on the root, which is never pruned.
      return Some(true);
    };
    let parent = node_at_mut(&mut self.root, parent_keys)?;
    let remaining_children = parent.children.get(&last).map_or(0, |n| n.children.len());
    match remaining_children {
      0 => {
        parent.children.remove(&last);
      }
      1 => {
        if let Some(emptied) = parent.children.get_mut(&last) {
          emptied.merge_only_child();
        }
      }
      _ => {}
    }
    if !parent_keys.is_empty() && parent.count == 0 && parent.children.len() == 1 {
      parent.merge_only_child();
    }
    Some(true)
  }

  /// Checks if `data` starts with *any* active subscription prefix.
  pub fn matches(&self, data: &[u8]) -> bool {
    let mut node = &self.root;
    let mut rest = data;
    loop {
      if node.count > 0 {
        return true;
      }
      let Some(first) = rest.first() else {
        return false;
      };
      match node.children.get(first) {
        Some(next) if rest.starts_with(&next.label) => {
          rest = &rest[next.label.len()..];
          node = next;
        }
        _ => return false,
      }
    }
  }

  /// Calls `visit` once for every distinct subscribed topic, regardless of
  /// how many times it was subscribed. Topics are visited in byte order.
  pub fn apply<F>(&self, mut visit: F)
  where
    F: FnMut(&[u8]),
  {
    let mut prefix = Vec::new();
    if self.root.count > 0 {
      visit(&prefix);
    }
    // Each entry remembers the prefix length to restore once its children
    // are exhausted.
    let mut stack = vec![(self.root.children.values(), 0usize)];
    while let Some((children, _)) = stack.last_mut() {
      match children.next() {
        Some(child) => {
          let base = prefix.len();
          prefix.extend_from_slice(&child.label);
          if child.count > 0 {
            visit(&prefix);
          }
          stack.push((child.children.values(), base));
        }
        None => {
          if let Some((_, base)) = stack.pop() {
            prefix.truncate(base);
          }
        }
      }
    }
  }

  /// Snapshot of all distinct subscribed topics.
  pub fn topics(&self) -> Vec<Vec<u8>> {
    let mut topics = Vec::with_capacity(self.distinct);
    self.apply(|topic| topics.push(topic.to_vec()));
    topics
  }

  /// Number of distinct subscribed topics.
  pub fn len(&self) -> usize {
    self.distinct
  }

  pub fn is_empty(&self) -> bool {
    self.distinct == 0
  }

  /// Drops every subscription.
  pub fn clear(&mut self) {
    self.root = TrieNode::default();
    self.distinct = 0;
  }
}
