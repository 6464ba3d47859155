use std::collections::HashMap;

use futures::future::try_join_all;
use tracing::debug;

use crate::limits::*;
use crate::model::*;

use super::{Engine, EngineError, NO_TENANT, StoreResultExt};

/// Count categories and price them. Open competitions bill nothing.
fn tally(competition: &Competition, categories: &HashMap<&str, BillingCategory>) -> BillingReport {
    let (mut player_count, mut visitor_count) = (0, 0);
    if competition.is_finished() {
        for category in categories.values() {
            match category {
                BillingCategory::Player => player_count += 1,
                BillingCategory::Visitor => visitor_count += 1,
            }
        }
    }
    let billing_player_yen = PLAYER_YEN * player_count;
    let billing_visitor_yen = VISITOR_YEN * visitor_count;
    BillingReport {
        competition_id: competition.id.clone(),
        competition_title: competition.title.clone(),
        player_count,
        visitor_count,
        billing_player_yen,
        billing_visitor_yen,
        billing_yen: billing_player_yen + billing_visitor_yen,
    }
}

impl Engine {
    /// Billing report for one competition, cached until the competition
    /// finishes or the engine is reset.
    pub async fn compute_billing_report(
        &self,
        tenant_id: TenantId,
        competition_id: &str,
    ) -> Result<BillingReport, EngineError> {
        let key = (tenant_id, competition_id.to_string());
        if let Some(report) = self.caches.billing_reports.get(&key) {
            return Ok(report);
        }
        let epoch = self.caches.epoch();

        let competition = self.retrieve_competition(tenant_id, competition_id).await?;
        let summaries = self.visit_summaries(tenant_id).await?;

        let mut guard = self.lock_tenant(tenant_id).await?;
        let competition = self.confirm_competition(&guard, competition).await?;
        let scored = self.scored_players(&guard).await?;

        let mut categories: HashMap<&str, BillingCategory> = HashMap::new();
        for visit in summaries.iter().filter(|v| v.competition_id == competition.id) {
            if competition.within_window(visit.min_visited_at) {
                categories.insert(&visit.player_id, BillingCategory::Visitor);
            }
        }
        // Scoring outranks visiting.
        for pair in scored.iter().filter(|s| s.competition_id == competition.id) {
            categories.insert(&pair.player_id, BillingCategory::Player);
        }

        let report = tally(&competition, &categories);
        // Stored before release so a finish (taken under the same lock) always
        // evicts after this write, never before it. Dropped if a reset ran
        // since any of its inputs were read.
        self.caches.billing_reports.set_if_epoch(key, report.clone(), epoch);
        guard.release();

        metrics::counter!(crate::observability::BILLING_REPORTS_COMPUTED_TOTAL).increment(1);
        debug!(
            tenant_id,
            competition_id,
            billing_yen = report.billing_yen,
            "billing report computed"
        );
        Ok(report)
    }

    /// Reports for every competition of the tenant, newest first.
    pub async fn billing_reports(&self, tenant_id: TenantId) -> Result<Vec<BillingReport>, EngineError> {
        self.tenant(tenant_id).await?;
        let competitions = self
            .store
            .list_competitions(tenant_id)
            .await
            .during("list competitions", tenant_id)?;
        let mut reports = Vec::with_capacity(competitions.len());
        for competition in &competitions {
            reports.push(self.compute_billing_report(tenant_id, &competition.id).await?);
        }
        Ok(reports)
    }

    /// One page of per-tenant totals, highest tenant id first. With `before`,
    /// only tenants whose id is below it are listed.
    pub async fn tenant_billings(
        &self,
        before: Option<TenantId>,
    ) -> Result<Vec<TenantBilling>, EngineError> {
        let tenants = self
            .store
            .list_tenants()
            .await
            .during("list tenants", NO_TENANT)?;
        let page: Vec<Tenant> = tenants
            .into_iter()
            .filter(|t| before.is_none_or(|b| t.id < b))
            .take(TENANT_BILLING_PAGE_SIZE)
            .collect();

        try_join_all(page.into_iter().map(|tenant| async move {
            let reports = self.billing_reports(tenant.id).await?;
            Ok::<_, EngineError>(TenantBilling {
                id: tenant.id.to_string(),
                name: tenant.name,
                display_name: tenant.display_name,
                billing_yen: reports.iter().map(|r| r.billing_yen).sum(),
            })
        }))
        .await
    }
}
