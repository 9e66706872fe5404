//! Effective-role resolution over the scheme scope chain.
//!
//! Precedence is Channel scheme, then Team scheme, then the fixed system
//! defaults. The precedence rule itself is the pure fold [`first_defined`];
//! the async wrappers only fetch and validate the scope overrides.

use super::{Actor, ChannelEngine};
use crate::error::{EngineError, EngineResult};
use crate::model::{Channel, RoleTriple, SchemeScope, Team, now_millis, permissions};
use tracing::info;

impl ChannelEngine {
    /// Resolve the three effective role names for a channel: Channel scheme
    /// over Team scheme over system defaults.
    pub async fn resolved_roles(
        &self,
        channel: &Channel,
        team: Option<&Team>,
    ) -> EngineResult<RoleTriple> {
        let channel_override = self
            .scheme_override(channel.scheme_id.as_deref(), SchemeScope::Channel, &channel.id)
            .await?;
        let team_override = self.team_scheme_override(team).await?;
        Ok(first_defined([channel_override, team_override]))
    }

    /// The ancestor chain with the channel scope skipped: Team scheme over
    /// system defaults. This is what the moderation `enabled` dimension
    /// probes.
    pub async fn higher_scoped_roles(&self, team: Option<&Team>) -> EngineResult<RoleTriple> {
        let team_override = self.team_scheme_override(team).await?;
        Ok(first_defined([team_override]))
    }

    async fn team_scheme_override(&self, team: Option<&Team>) -> EngineResult<Option<RoleTriple>> {
        match team {
            Some(team) => {
                self.scheme_override(team.scheme_id.as_deref(), SchemeScope::Team, &team.id)
                    .await
            }
            None => Ok(None),
        }
    }

    /// Load one scope's override. Soft-deleted schemes fall through to the
    /// next scope; a dangling or scope-mismatched reference is an integrity
    /// fault and is surfaced, not defaulted.
    async fn scheme_override(
        &self,
        scheme_id: Option<&str>,
        expected_scope: SchemeScope,
        owner_id: &str,
    ) -> EngineResult<Option<RoleTriple>> {
        let Some(scheme_id) = scheme_id else {
            return Ok(None);
        };
        let scheme = self.store().get_scheme(scheme_id).await?.ok_or_else(|| {
            EngineError::Integrity(format!(
                "{owner_id} references missing scheme {scheme_id}"
            ))
        })?;
        if scheme.scope != expected_scope {
            return Err(EngineError::Integrity(format!(
                "scheme {scheme_id} has scope {} where {} was required",
                scheme.scope, expected_scope
            )));
        }
        if scheme.is_deleted() {
            return Ok(None);
        }
        Ok(Some(RoleTriple::from_scheme(&scheme)))
    }

    /// Assign an existing Channel-scope scheme to a channel.
    pub async fn set_channel_scheme(
        &self,
        actor: &Actor,
        channel_id: &str,
        scheme_id: &str,
    ) -> EngineResult<Channel> {
        self.require_privileged(actor, permissions::MANAGE_SYSTEM)?;
        let _guard = self.lock_channel(channel_id).await;

        let mut channel = self.require_channel(channel_id).await?;
        let scheme = self
            .store()
            .get_scheme(scheme_id)
            .await?
            .ok_or_else(|| EngineError::SchemeNotFound(scheme_id.to_string()))?;
        if scheme.scope != SchemeScope::Channel {
            return Err(EngineError::SchemeScopeMismatch(scheme_id.to_string()));
        }

        channel.scheme_id = Some(scheme_id.to_string());
        channel.update_at = now_millis();
        self.store().update_channel(&channel).await?;
        info!(channel = %channel.id, scheme = %scheme_id, "Channel scheme assigned");
        Ok(channel)
    }
}

/// Left-to-right first-match fold over the scope overrides, falling back to
/// the system defaults.
fn first_defined<const N: usize>(overrides: [Option<RoleTriple>; N]) -> RoleTriple {
    overrides
        .into_iter()
        .flatten()
        .next()
        .unwrap_or_else(RoleTriple::system_default)
}
