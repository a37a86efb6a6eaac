//! Join-gateway discovery.
//!
//! Given a split gateway, every outgoing branch is walked forward until it
//! reaches a converging gateway of the same type, runs into a dead end, or
//! hits a gateway that closes an enclosing split. Nested splits are resolved
//! recursively and skipped over.

use std::collections::HashSet;

use flowline_model::{FlowNode, GatewayDirection};
use tracing::{debug, warn};

use crate::error::{FacadeError, ModelIntegrityError};
use crate::facade::ProcessModelFacade;

impl ProcessModelFacade {
  /// Find the converging gateway that closes `split`.
  ///
  /// `parent` is the split gateway enclosing `split`, if any. Returns
  /// `Ok(None)` when no branch reaches a join, which is legal for exclusive
  /// splits whose branches end separately. Branches that converge on
  /// different joins make the model ambiguous.
  pub fn find_join(
    &self,
    split: &FlowNode,
    parent: Option<&FlowNode>,
  ) -> Result<Option<&FlowNode>, FacadeError> {
    self.resolve_join(split, parent, &mut Vec::new())
  }

  /// `resolving` holds the splits whose joins are being searched, outermost
  /// first.
  fn resolve_join(
    &self,
    split: &FlowNode,
    parent: Option<&FlowNode>,
    resolving: &mut Vec<String>,
  ) -> Result<Option<&FlowNode>, FacadeError> {
    let depth = resolving.len();
    if depth > self.config.max_join_depth {
      return Err(
        ModelIntegrityError::JoinDepthExceeded {
          split_gateway: split.id.clone(),
          max_depth: self.config.max_join_depth,
        }
        .into(),
      );
    }

    if resolving.contains(&split.id) {
      // A branch led back into a split that is still being resolved.
      let enclosing = resolving.last().unwrap_or(&split.id);
      return Err(
        ModelIntegrityError::CyclicBranch {
          split_gateway: enclosing.clone(),
          node_id: split.id.clone(),
        }
        .into(),
      );
    }

    resolving.push(split.id.clone());
    let candidates = self.branch_candidates(split, parent, resolving);
    resolving.pop();
    let candidates = candidates?;

    let mut distinct: Vec<&FlowNode> = Vec::new();
    for &candidate in &candidates {
      if !distinct.iter().any(|known| known.id == candidate.id) {
        distinct.push(candidate);
      }
    }

    if distinct.len() > 1 {
      let candidate_ids: Vec<String> = candidates.iter().map(|c| c.id.clone()).collect();
      warn!(
        split_gateway = %split.id,
        parent_split_gateway = ?parent.map(|p| p.id.as_str()),
        candidates = ?candidate_ids,
        "ambiguous_join"
      );
      return Err(
        ModelIntegrityError::AmbiguousJoin {
          split_gateway: split.id.clone(),
          parent_split_gateway: parent.map(|p| p.id.clone()),
          candidates: candidate_ids,
        }
        .into(),
      );
    }

    let join = distinct.into_iter().next();
    debug!(
      split_gateway = %split.id,
      join_gateway = ?join.map(|j| j.id.as_str()),
      depth,
      "join_resolved"
    );
    Ok(join)
  }

  fn branch_candidates(
    &self,
    split: &FlowNode,
    parent: Option<&FlowNode>,
    resolving: &mut Vec<String>,
  ) -> Result<Vec<&FlowNode>, FacadeError> {
    let mut candidates = Vec::new();
    for flow in self.outgoing_flows(&split.id) {
      let Some(branch_start) = self.flow_node_by_id(&flow.target_ref) else {
        continue;
      };
      if let Some(candidate) = self.walk_branch(split, parent, branch_start, resolving)? {
        candidates.push(candidate);
      }
    }
    Ok(candidates)
  }

  /// Walk one branch of `split` and return the join it converges on.
  fn walk_branch<'a>(
    &'a self,
    split: &FlowNode,
    parent: Option<&FlowNode>,
    branch_start: &'a FlowNode,
    resolving: &mut Vec<String>,
  ) -> Result<Option<&'a FlowNode>, FacadeError> {
    let split_type = split.bpmn_type();
    let mut visited: HashSet<&str> = HashSet::new();
    let mut current = branch_start;

    loop {
      if !visited.insert(current.id.as_str()) {
        return Err(
          ModelIntegrityError::CyclicBranch {
            split_gateway: split.id.clone(),
            node_id: current.id.clone(),
          }
          .into(),
        );
      }

      if current.bpmn_type() == split_type && current.has_direction(GatewayDirection::Converging) {
        return Ok(Some(current));
      }

      if current.has_direction(GatewayDirection::Diverging) {
        let Some(nested_join) = self.resolve_join(current, Some(split), resolving)? else {
          return Ok(None);
        };

        if nested_join.bpmn_type() == current.bpmn_type() {
          // The nested split's own join; the branch continues behind it.
          match self.successor(nested_join)? {
            Some(next) => current = next,
            None => return Ok(None),
          }
        } else {
          // A join closing an enclosing split, evaluated at this level.
          current = nested_join;
        }
        continue;
      }

      if let Some(parent) = parent {
        if current.is_gateway() && current.bpmn_type() == parent.bpmn_type() {
          return Ok(Some(current));
        }
      }

      match self.successor(current)? {
        Some(next) => current = next,
        None => return Ok(None),
      }
    }
  }

  fn successor(&self, node: &FlowNode) -> Result<Option<&FlowNode>, FacadeError> {
    Ok(self.next_nodes(node)?.into_iter().next())
  }
}
