//! List diffing for incremental consumer updates.
//!
//! `diff(old, new)` aligns two snapshots by story id (longest common
//! subsequence) and emits the fewest inserts and removes that turn one into
//! the other. Aligned pairs whose visible content changed become `Change`.
//! Operations are ordered so that applying them one after another to `old`,
//! each at its stated position, yields `new`.

use crate::models::Story;

#[derive(Debug, Clone, PartialEq)]
pub enum DiffOp {
    Insert { position: usize, story: Story },
    Remove { position: usize },
    Change { position: usize, story: Story },
}

impl DiffOp {
    pub fn position(&self) -> usize {
        match self {
            DiffOp::Insert { position, .. }
            | DiffOp::Remove { position }
            | DiffOp::Change { position, .. } => *position,
        }
    }
}

enum Step {
    Keep(usize, usize),
    Delete,
    Add(usize),
}

/// Minimal ordered edit script from `old` to `new`.
pub fn diff(old: &[Story], new: &[Story]) -> Vec<DiffOp> {
    let prefix = old
        .iter()
        .zip(new)
        .take_while(|(a, b)| a.id == b.id)
        .count();
    let suffix = old[prefix..]
        .iter()
        .rev()
        .zip(new[prefix..].iter().rev())
        .take_while(|(a, b)| a.id == b.id)
        .count();

    let old_mid = &old[prefix..old.len() - suffix];
    let new_mid = &new[prefix..new.len() - suffix];

    let mut steps: Vec<Step> = (0..prefix).map(|i| Step::Keep(i, i)).collect();
    steps.extend(
        align(old_mid, new_mid)
            .into_iter()
            .map(|step| match step {
                Step::Keep(i, j) => Step::Keep(prefix + i, prefix + j),
                Step::Add(j) => Step::Add(prefix + j),
                Step::Delete => Step::Delete,
            }),
    );
    steps.extend((0..suffix).map(|k| {
        Step::Keep(old.len() - suffix + k, new.len() - suffix + k)
    }));

    let mut ops = Vec::new();
    let mut position = 0;
    for step in steps {
        match step {
            Step::Keep(i, j) => {
                if !old[i].content_eq(&new[j]) {
                    ops.push(DiffOp::Change {
                        position,
                        story: new[j].clone(),
                    });
                }
                position += 1;
            }
            Step::Delete => ops.push(DiffOp::Remove { position }),
            Step::Add(j) => {
                ops.push(DiffOp::Insert {
                    position,
                    story: new[j].clone(),
                });
                position += 1;
            }
        }
    }
    ops
}

/// LCS alignment by id. Removals are ordered before insertions at the same
/// point so a replaced row reads as remove-then-insert.
fn align(old: &[Story], new: &[Story]) -> Vec<Step> {
    let (n, m) = (old.len(), new.len());
    if n == 0 {
        return (0..m).map(Step::Add).collect();
    }
    if m == 0 {
        return (0..n).map(|_| Step::Delete).collect();
    }

    // lcs[i][j] = LCS length of old[i..] and new[j..]
    let mut lcs = vec![vec![0u32; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            lcs[i][j] = if old[i].id == new[j].id {
                lcs[i + 1][j + 1] + 1
            } else {
                lcs[i + 1][j].max(lcs[i][j + 1])
            };
        }
    }

    let mut steps = Vec::with_capacity(n.max(m));
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if old[i].id == new[j].id {
            steps.push(Step::Keep(i, j));
            i += 1;
            j += 1;
        } else if lcs[i + 1][j] >= lcs[i][j + 1] {
            steps.push(Step::Delete);
            i += 1;
        } else {
            steps.push(Step::Add(j));
            j += 1;
        }
    }
    steps.extend((i..n).map(|_| Step::Delete));
    steps.extend((j..m).map(Step::Add));
    steps
}

/// Apply `ops` to a copy of `old`, in order.
pub fn apply(old: &[Story], ops: &[DiffOp]) -> Vec<Story> {
    let mut list = old.to_vec();
    for op in ops {
        match op {
            DiffOp::Insert { position, story } => list.insert(*position, story.clone()),
            DiffOp::Remove { position } => {
                list.remove(*position);
            }
            DiffOp::Change { position, story } => list[*position] = story.clone(),
        }
    }
    list
}
