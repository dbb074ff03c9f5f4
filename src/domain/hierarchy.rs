//! Rebuilds parent/child task trees from a flat list.
//!
//! The input is treated as an arena indexed by position. Parent links are
//! resolved once, each cycle is broken by promoting one member to a root, and
//! the trees are assembled bottom-up without recursion.

use crate::domain::models::Task;
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;

pub struct TaskNode {
    pub task: Task,
    pub depth: u32,
    pub has_children: bool,
    pub children: Vec<TaskNode>,
}

impl TaskNode {
    /// Percentage of done tasks in the subtree below this node. Leaves report
    /// 100 when done and their own cached progress otherwise.
    pub fn subtree_progress(&self) -> u8 {
        if self.children.is_empty() {
            return if self.task.is_completed() {
                100
            } else {
                self.task.progress.min(100)
            };
        }
        let (done, total) = self.descendant_counts();
        percent(done, total)
    }

    /// Writes `subtree_progress` into the cached `progress` of every node that
    /// has children, in one post-order pass over the subtree.
    pub fn rollup_progress(&mut self) {
        let walk = preorder(std::slice::from_ref(self));
        let mut done = vec![0usize; walk.len()];
        let mut total = vec![0usize; walk.len()];
        for (position, entry) in walk.iter().enumerate().rev() {
            if let Some(parent) = entry.parent {
                let done_here = done[position] + usize::from(entry.node.task.is_completed());
                let total_here = total[position] + 1;
                done[parent] += done_here;
                total[parent] += total_here;
            }
        }

        // Same visiting order as `preorder`, so positions line up.
        let mut position = 0;
        let mut stack: Vec<&mut TaskNode> = vec![self];
        while let Some(node) = stack.pop() {
            if node.has_children {
                node.task.progress = percent(done[position], total[position]);
            }
            position += 1;
            stack.extend(node.children.iter_mut().rev());
        }
    }

    fn descendant_counts(&self) -> (usize, usize) {
        let mut done = 0;
        let mut total = 0;
        let mut stack: Vec<&TaskNode> = self.children.iter().collect();
        while let Some(node) = stack.pop() {
            total += 1;
            if node.task.is_completed() {
                done += 1;
            }
            stack.extend(node.children.iter());
        }
        (done, total)
    }
}

fn percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    (done * 100 / total) as u8
}

impl Drop for TaskNode {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.children);
        while let Some(mut node) = pending.pop() {
            pending.append(&mut node.children);
        }
    }
}

impl fmt::Debug for TaskNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskNode")
            .field("id", &self.task.id)
            .field("depth", &self.depth)
            .field("children", &self.children.len())
            .finish()
    }
}

/// Result of `build_hierarchy`: the root nodes plus the ids that had to be
/// promoted to roots because their parent was missing or formed a cycle.
///
/// Serializes flat: `nodes` lists every task in pre-order with its depth and
/// the index of its parent entry.
#[derive(Debug, Default)]
pub struct TaskForest {
    pub roots: Vec<TaskNode>,
    pub orphans: Vec<String>,
    pub cycles: Vec<String>,
}

impl TaskForest {
    pub fn len(&self) -> usize {
        let mut count = 0;
        let mut stack: Vec<&TaskNode> = self.roots.iter().collect();
        while let Some(node) = stack.pop() {
            count += 1;
            stack.extend(node.children.iter());
        }
        count
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn rollup_progress(&mut self) {
        for root in &mut self.roots {
            root.rollup_progress();
        }
    }
}

struct Visit<'a> {
    node: &'a TaskNode,
    parent: Option<usize>,
}

fn preorder(roots: &[TaskNode]) -> Vec<Visit<'_>> {
    let mut visits = Vec::new();
    let mut stack: Vec<Visit<'_>> = roots
        .iter()
        .rev()
        .map(|node| Visit { node, parent: None })
        .collect();
    while let Some(visit) = stack.pop() {
        let position = visits.len();
        stack.extend(visit.node.children.iter().rev().map(|node| Visit {
            node,
            parent: Some(position),
        }));
        visits.push(visit);
    }
    visits
}

#[derive(Serialize)]
struct FlatNode<'a> {
    task: &'a Task,
    depth: u32,
    parent: Option<usize>,
    has_children: bool,
}

#[derive(Serialize)]
struct FlatForest<'a> {
    nodes: Vec<FlatNode<'a>>,
    orphans: &'a [String],
    cycles: &'a [String],
}

impl Serialize for TaskForest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let nodes = preorder(&self.roots)
            .into_iter()
            .map(|visit| FlatNode {
                task: &visit.node.task,
                depth: visit.node.depth,
                parent: visit.parent,
                has_children: visit.node.has_children,
            })
            .collect();
        FlatForest {
            nodes,
            orphans: &self.orphans,
            cycles: &self.cycles,
        }
        .serialize(serializer)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    OnPath,
    Done,
}

pub fn build_hierarchy(tasks: &[Task]) -> TaskForest {
    let mut index = HashMap::<&str, usize>::with_capacity(tasks.len());
    for (position, task) in tasks.iter().enumerate() {
        index.entry(task.id.as_str()).or_insert(position);
    }

    let mut orphans = Vec::new();
    let mut cycles = Vec::new();
    let mut parents = Vec::<Option<usize>>::with_capacity(tasks.len());
    for (position, task) in tasks.iter().enumerate() {
        let Some(parent_id) = task.parent_ref() else {
            parents.push(None);
            continue;
        };
        match index.get(parent_id) {
            Some(&parent) if parent == position => {
                tracing::warn!(task_id = %task.id, "task is its own parent, treating as root");
                cycles.push(task.id.clone());
                parents.push(None);
            }
            Some(&parent) => parents.push(Some(parent)),
            None => {
                tracing::debug!(task_id = %task.id, parent_id, "parent not found, treating as root");
                orphans.push(task.id.clone());
                parents.push(None);
            }
        }
    }

    break_cycles(tasks, &mut parents, &mut cycles);

    let mut children = vec![Vec::<usize>::new(); tasks.len()];
    let mut roots = Vec::new();
    for (position, parent) in parents.iter().enumerate() {
        match parent {
            Some(parent) => children[*parent].push(position),
            None => roots.push(position),
        }
    }
    roots.sort_by_key(|&position| tasks[position].order);
    for siblings in &mut children {
        siblings.sort_by_key(|&position| tasks[position].order);
    }

    let mut preorder = Vec::with_capacity(tasks.len());
    let mut stack: Vec<(usize, u32)> = roots.iter().rev().map(|&root| (root, 0)).collect();
    while let Some((position, depth)) = stack.pop() {
        preorder.push((position, depth));
        stack.extend(children[position].iter().rev().map(|&child| (child, depth + 1)));
    }

    let mut built: Vec<Option<TaskNode>> = (0..tasks.len()).map(|_| None).collect();
    for &(position, depth) in preorder.iter().rev() {
        let nodes = children[position]
            .iter()
            .filter_map(|&child| built[child].take())
            .collect::<Vec<_>>();
        built[position] = Some(TaskNode {
            task: tasks[position].clone(),
            depth,
            has_children: !nodes.is_empty(),
            children: nodes,
        });
    }

    TaskForest {
        roots: roots
            .iter()
            .filter_map(|&root| built[root].take())
            .collect(),
        orphans,
        cycles,
    }
}

/// Walks every parent chain once. When a walk reaches a node that is already
/// on the current path, that node's parent link is cut, which makes it the
/// root of what used to be the cycle.
fn break_cycles(tasks: &[Task], parents: &mut [Option<usize>], cycles: &mut Vec<String>) {
    let mut marks = vec![Mark::Unvisited; tasks.len()];
    let mut path = Vec::new();
    for start in 0..tasks.len() {
        let mut cursor = Some(start);
        while let Some(node) = cursor {
            match marks[node] {
                Mark::Unvisited => {
                    marks[node] = Mark::OnPath;
                    path.push(node);
                    cursor = parents[node];
                }
                Mark::OnPath => {
                    tracing::warn!(task_id = %tasks[node].id, "parent cycle detected, treating as root");
                    parents[node] = None;
                    cycles.push(tasks[node].id.clone());
                    cursor = None;
                }
                Mark::Done => cursor = None,
            }
        }
        for node in path.drain(..) {
            marks[node] = Mark::Done;
        }
    }
}

/// Pre-order flatten: every node once, parents before their children.
pub fn flatten(roots: &[TaskNode]) -> Vec<Task> {
    let mut flat = Vec::new();
    let mut stack: Vec<&TaskNode> = roots.iter().rev().collect();
    while let Some(node) = stack.pop() {
        flat.push(node.task.clone());
        stack.extend(node.children.iter().rev());
    }
    flat
}
