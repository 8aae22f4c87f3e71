//! Filter bar and summary counts for a CRM sheet.

use super::{CrmClient, DealStatus, FieldValueError, LeadStage, LeadType};
use serde::Serialize;
use ts_rs::TS;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientFilter {
    pub search: Option<String>,
    pub lead_stage: Option<LeadStage>,
    pub lead_type: Option<LeadType>,
    pub deal_status: Option<DealStatus>,
    pub location: Option<String>,
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

impl ClientFilter {
    /// Build from raw query values; blank values mean "any".
    pub fn from_params(
        search: Option<&str>,
        lead_stage: Option<&str>,
        lead_type: Option<&str>,
        deal_status: Option<&str>,
        location: Option<&str>,
    ) -> Result<Self, FieldValueError> {
        Ok(Self {
            search: non_empty(search).map(str::to_lowercase),
            lead_stage: non_empty(lead_stage).map(str::parse).transpose()?,
            lead_type: non_empty(lead_type).map(str::parse).transpose()?,
            deal_status: non_empty(deal_status).map(str::parse).transpose()?,
            location: non_empty(location).map(str::to_lowercase),
        })
    }

    pub fn matches(&self, client: &CrmClient) -> bool {
        let contains = |haystack: &Option<String>, needle: &str| {
            haystack
                .as_deref()
                .is_some_and(|h| h.to_lowercase().contains(needle))
        };

        let search_ok = self.search.as_deref().is_none_or(|q| {
            client.client_name.to_lowercase().contains(q)
                || client
                    .customer_number
                    .as_deref()
                    .is_some_and(|n| n.contains(q))
                || contains(&client.calling_comment, q)
        });

        search_ok
            && self.lead_stage.is_none_or(|s| client.lead_stage == s)
            && self.lead_type.is_none_or(|t| client.lead_type == t)
            && self.deal_status.is_none_or(|d| client.deal_status == d)
            && self
                .location
                .as_deref()
                .is_none_or(|l| contains(&client.location_category, l))
    }

    pub fn apply<'a>(&'a self, clients: &'a [CrmClient]) -> impl Iterator<Item = &'a CrmClient> {
        clients.iter().filter(|c| self.matches(c))
    }
}

/// Counts over the whole sheet, independent of the active filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
pub struct ClientStats {
    pub total: usize,
    pub hot: usize,
    pub warm: usize,
    pub cold: usize,
    pub locked: usize,
}

impl ClientStats {
    pub fn from_clients(clients: &[CrmClient]) -> Self {
        clients.iter().fold(
            ClientStats {
                total: clients.len(),
                ..Default::default()
            },
            |mut stats, c| {
                match c.lead_type {
                    LeadType::Hot => stats.hot += 1,
                    LeadType::Warm => stats.warm += 1,
                    LeadType::Cold => stats.cold += 1,
                }
                if c.deal_status == DealStatus::Locked {
                    stats.locked += 1;
                }
                stats
            },
        )
    }
}

/// Distinct non-empty locations in first-seen order.
pub fn distinct_locations(clients: &[CrmClient]) -> Vec<String> {
    let mut seen = Vec::new();
    for location in clients
        .iter()
        .filter_map(|c| c.location_category.as_deref())
        .filter(|l| !l.is_empty())
    {
        if !seen.iter().any(|s: &String| s == location) {
            seen.push(location.to_owned());
        }
    }
    seen
}
