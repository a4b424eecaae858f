//! Tag forest with ancestor closure
//!
//! Tags live in an arena indexed by position; parent and child links are
//! stored as indices, so the structure holds no owning pointers and can be
//! shared read-only across threads once built.
//!
//! Construction uses Kahn's algorithm over parent links: every tag reachable
//! downward from a root is ordered, and anything left over sits on (or below)
//! a cycle, which is reported as [`AuthzError::TagCycle`].

use std::collections::{HashMap, VecDeque};

use tracing::{debug, info};

use super::{Tag, TagId, TagSet};
use crate::error::{AuthzError, Result};

/// Arena node
#[derive(Debug, Clone)]
pub struct TagNode {
    /// Tag as read from the store
    pub tag: Tag,

    /// Arena index of the effective parent (None for roots)
    parent: Option<usize>,

    /// Arena indices of children, sorted by name
    children: Vec<usize>,

    /// Distance from the root
    depth: usize,
}

impl TagNode {
    /// Distance from the root (roots have depth 0)
    pub fn depth(&self) -> usize {
        self.depth
    }
}

/// Immutable tag forest
#[derive(Debug, Clone, Default)]
pub struct TagTree {
    nodes: Vec<TagNode>,
    by_id: HashMap<TagId, usize>,
    by_name: HashMap<String, usize>,
    /// Root indices, sorted by name
    roots: Vec<usize>,
}

impl TagTree {
    /// Build the forest from a flat tag list
    ///
    /// A tag whose parent id is not present in `tags` becomes a root.
    ///
    /// # Errors
    ///
    /// - [`AuthzError::InvalidTag`] on duplicate ids or names, or a name
    ///   starting with `$`
    /// - [`AuthzError::TagCycle`] if parent links form a cycle
    pub fn build(tags: Vec<Tag>) -> Result<Self> {
        let mut by_id = HashMap::with_capacity(tags.len());
        let mut by_name = HashMap::with_capacity(tags.len());

        for (idx, tag) in tags.iter().enumerate() {
            tag.check_name()?;
            if by_id.insert(tag.id, idx).is_some() {
                return Err(AuthzError::InvalidTag(format!("duplicate tag id {}", tag.id)));
            }
            if by_name.insert(tag.name.clone(), idx).is_some() {
                return Err(AuthzError::InvalidTag(format!(
                    "duplicate tag name `{}`",
                    tag.name
                )));
            }
        }

        let mut nodes: Vec<TagNode> = tags
            .into_iter()
            .map(|tag| TagNode {
                tag,
                parent: None,
                children: Vec::new(),
                depth: 0,
            })
            .collect();

        // Resolve parent links; dangling references degrade to roots
        for idx in 0..nodes.len() {
            let Some(parent_id) = nodes[idx].tag.parent_id else {
                continue;
            };
            match by_id.get(&parent_id) {
                Some(&parent_idx) => {
                    nodes[idx].parent = Some(parent_idx);
                    nodes[parent_idx].children.push(idx);
                }
                None => {
                    debug!(
                        tag = %nodes[idx].tag.name,
                        parent = %parent_id,
                        "Tag parent not found, treating as root"
                    );
                }
            }
        }

        // Kahn's algorithm from the roots down
        let mut queue: VecDeque<usize> = (0..nodes.len())
            .filter(|&idx| nodes[idx].parent.is_none())
            .collect();
        let mut visited = vec![false; nodes.len()];
        let mut visited_count = 0;

        while let Some(current) = queue.pop_front() {
            visited[current] = true;
            visited_count += 1;
            let depth = nodes[current].depth;
            for child in nodes[current].children.clone() {
                nodes[child].depth = depth + 1;
                queue.push_back(child);
            }
        }

        if visited_count != nodes.len() {
            return Err(AuthzError::TagCycle(describe_cycle(&nodes, &visited)));
        }

        for idx in 0..nodes.len() {
            let mut children = std::mem::take(&mut nodes[idx].children);
            children.sort_by(|&a, &b| sibling_order(&nodes[a].tag, &nodes[b].tag));
            nodes[idx].children = children;
        }

        let mut roots: Vec<usize> = (0..nodes.len())
            .filter(|&idx| nodes[idx].parent.is_none())
            .collect();
        roots.sort_by(|&a, &b| sibling_order(&nodes[a].tag, &nodes[b].tag));

        info!(tags = nodes.len(), roots = roots.len(), "Built tag tree");

        Ok(Self {
            nodes,
            by_id,
            by_name,
            roots,
        })
    }

    /// Number of tags
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the tree holds no tags
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Look up a tag by id
    pub fn get(&self, id: TagId) -> Option<&Tag> {
        self.by_id.get(&id).map(|&idx| &self.nodes[idx].tag)
    }

    /// Look up a tag by name
    pub fn by_name(&self, name: &str) -> Option<&Tag> {
        self.by_name.get(name).map(|&idx| &self.nodes[idx].tag)
    }

    /// Name of a tag id, if known
    pub fn name_of(&self, id: TagId) -> Option<&str> {
        self.get(id).map(|t| t.name.as_str())
    }

    /// Effective parent of a tag (None for roots, including dangling parents)
    pub fn parent_of(&self, id: TagId) -> Option<&Tag> {
        let idx = *self.by_id.get(&id)?;
        self.nodes[idx].parent.map(|p| &self.nodes[p].tag)
    }

    /// Root tags, sorted by name
    pub fn roots(&self) -> impl Iterator<Item = &Tag> + '_ {
        self.roots.iter().map(|&idx| &self.nodes[idx].tag)
    }

    /// Direct children of a tag, sorted by name
    pub fn children(&self, id: TagId) -> Vec<&Tag> {
        self.by_id
            .get(&id)
            .map(|&idx| {
                self.nodes[idx]
                    .children
                    .iter()
                    .map(|&c| &self.nodes[c].tag)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Pre-order walk of the forest in sibling order
    pub fn depth_first(&self) -> Vec<&TagNode> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<usize> = self.roots.iter().rev().copied().collect();
        while let Some(idx) = stack.pop() {
            out.push(&self.nodes[idx]);
            stack.extend(self.nodes[idx].children.iter().rev().copied());
        }
        out
    }

    /// The tag itself plus all of its ancestors up to a root
    ///
    /// Unknown ids yield an empty set.
    pub fn closure(&self, id: TagId) -> TagSet {
        let mut set = TagSet::new();
        let mut current = self.by_id.get(&id).copied();
        while let Some(idx) = current {
            set.insert(self.nodes[idx].tag.id);
            current = self.nodes[idx].parent;
        }
        set
    }

    /// Union of the closures of every tag in `tags`
    pub fn closure_of(&self, tags: &TagSet) -> TagSet {
        let mut set = TagSet::new();
        for id in tags.iter() {
            set.extend(self.closure(id).iter());
        }
        set
    }

    /// Names of the known tags in `tags`, in id order
    pub fn names<'a>(&'a self, tags: &'a TagSet) -> impl Iterator<Item = &'a str> + 'a {
        tags.iter().filter_map(move |id| self.name_of(id))
    }
}

fn sibling_order(a: &Tag, b: &Tag) -> std::cmp::Ordering {
    a.name.cmp(&b.name).then(a.id.cmp(&b.id))
}

/// Deterministic cycle description starting at the smallest tag id involved
fn describe_cycle(nodes: &[TagNode], visited: &[bool]) -> String {
    let Some(start) = (0..nodes.len())
        .filter(|&idx| !visited[idx])
        .min_by_key(|&idx| nodes[idx].tag.id)
    else {
        return "unknown cycle".to_string();
    };

    // Walk parent links until a node repeats; that node is on the cycle
    let mut seen = vec![false; nodes.len()];
    let mut current = start;
    while !seen[current] {
        seen[current] = true;
        match nodes[current].parent {
            Some(parent) => current = parent,
            None => return "unknown cycle".to_string(),
        }
    }

    let mut cycle = vec![current];
    let mut next = nodes[current].parent;
    while let Some(idx) = next {
        if idx == current {
            break;
        }
        cycle.push(idx);
        next = nodes[idx].parent;
    }

    let pivot = cycle
        .iter()
        .enumerate()
        .min_by_key(|(_, &idx)| nodes[idx].tag.id)
        .map(|(pos, _)| pos)
        .unwrap_or(0);
    cycle.rotate_left(pivot);
    cycle.push(cycle[0]);

    cycle
        .iter()
        .map(|&idx| nodes[idx].tag.name.as_str())
        .collect::<Vec<_>>()
        .join(" -> ")
}
