use crate::records::{Conversion, ConversionStatus, Valve};
use chrono::{DateTime, NaiveDate, Utc};

/// Filter criteria that can be sent as query parameters.
pub trait Criteria: Default + Clone {
    fn query_params(&self) -> Vec<(String, String)>;
}

/// A record shown in a filterable list.
pub trait Listed: Clone {
    type Criteria: Criteria;
    fn id(&self) -> i64;
    /// In-memory equivalent of the server-side filter.
    fn matches(&self, criteria: &Self::Criteria) -> bool;
    fn created_at(&self) -> Option<DateTime<Utc>> {
        None
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterMode {
    Server,
    Client,
}

impl FilterMode {
    pub fn from_flag(use_api_filtering: bool) -> Self {
        if use_api_filtering {
            FilterMode::Server
        } else {
            FilterMode::Client
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            FilterMode::Server => "server",
            FilterMode::Client => "local",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn toggled(self) -> Self {
        match self {
            SortOrder::Asc => SortOrder::Desc,
            SortOrder::Desc => SortOrder::Asc,
        }
    }

    pub fn ordering_param(self) -> &'static str {
        match self {
            SortOrder::Asc => "created_at",
            SortOrder::Desc => "-created_at",
        }
    }

    pub fn arrow(self) -> &'static str {
        match self {
            SortOrder::Asc => "↑",
            SortOrder::Desc => "↓",
        }
    }
}

/// Full list as last fetched plus the derived filtered/sorted view.
#[derive(Clone, Debug)]
pub struct ListView<T: Listed> {
    all: Vec<T>,
    visible: Vec<T>,
    pub mode: FilterMode,
    pub sort: Option<SortOrder>,
    latest_token: u64,
    pub loading: bool,
}

impl<T: Listed> ListView<T> {
    pub fn new(mode: FilterMode, sort: Option<SortOrder>) -> Self {
        Self {
            all: Vec::new(),
            visible: Vec::new(),
            mode,
            sort,
            latest_token: 0,
            loading: false,
        }
    }

    pub fn all(&self) -> &[T] {
        &self.all
    }

    pub fn visible(&self) -> &[T] {
        &self.visible
    }

    /// Start a fetch: returns the request token and the query to send.
    pub fn begin_fetch(&mut self, criteria: &T::Criteria) -> (u64, Vec<(String, String)>) {
        self.latest_token += 1;
        self.loading = true;
        let query = match self.mode {
            FilterMode::Server => {
                let mut q = criteria.query_params();
                if let Some(order) = self.sort {
                    q.push(("ordering".to_string(), order.ordering_param().to_string()));
                }
                q
            }
            FilterMode::Client => Vec::new(),
        };
        (self.latest_token, query)
    }

    /// Apply a fetch result. Responses to superseded requests are dropped.
    pub fn accept(&mut self, token: u64, items: Vec<T>, criteria: &T::Criteria) -> bool {
        if token != self.latest_token {
            return false;
        }
        self.loading = false;
        self.all = items;
        self.refilter(criteria);
        true
    }

    /// Mark a failed fetch; returns false when the failure belongs to a stale request.
    pub fn fail(&mut self, token: u64) -> bool {
        if token != self.latest_token {
            return false;
        }
        self.loading = false;
        true
    }

    pub fn refilter(&mut self, criteria: &T::Criteria) {
        self.visible = match self.mode {
            FilterMode::Server => self.all.clone(),
            FilterMode::Client => Self::derive(&self.all, criteria, self.sort),
        };
    }

    /// Filter then stable-sort; ties keep source order in both directions.
    pub fn derive(all: &[T], criteria: &T::Criteria, sort: Option<SortOrder>) -> Vec<T> {
        let mut out: Vec<T> = all.iter().filter(|r| r.matches(criteria)).cloned().collect();
        if let Some(order) = sort {
            out.sort_by(|a, b| {
                let (ka, kb) = (a.created_at(), b.created_at());
                match order {
                    SortOrder::Asc => ka.cmp(&kb),
                    SortOrder::Desc => kb.cmp(&ka),
                }
            });
        }
        out
    }

    /// Flip the sort direction. Returns true when the server must be asked again.
    pub fn toggle_sort(&mut self, criteria: &T::Criteria) -> bool {
        self.sort = Some(self.sort.unwrap_or_default().toggled());
        match self.mode {
            FilterMode::Server => true,
            FilterMode::Client => {
                self.refilter(criteria);
                false
            }
        }
    }

    pub fn replace_by_id(&mut self, item: T) {
        let id = item.id();
        for list in [&mut self.all, &mut self.visible] {
            for slot in list.iter_mut().filter(|r| r.id() == id) {
                *slot = item.clone();
            }
        }
    }

    pub fn update_by_id(&mut self, id: i64, f: impl Fn(&mut T)) {
        for list in [&mut self.all, &mut self.visible] {
            for slot in list.iter_mut().filter(|r| r.id() == id) {
                f(slot);
            }
        }
    }

    pub fn remove_by_id(&mut self, id: i64) {
        self.all.retain(|r| r.id() != id);
        self.visible.retain(|r| r.id() != id);
    }

    pub fn find(&self, id: i64) -> Option<&T> {
        self.all.iter().find(|r| r.id() == id)
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ValveCriteria {
    pub name: String,
    pub area: String,
}

impl Criteria for ValveCriteria {
    fn query_params(&self) -> Vec<(String, String)> {
        let mut q = Vec::new();
        if !self.name.is_empty() {
            q.push(("name".to_string(), self.name.clone()));
        }
        if !self.area.is_empty() {
            q.push(("area".to_string(), self.area.clone()));
        }
        q
    }
}

fn icontains(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

impl Listed for Valve {
    type Criteria = ValveCriteria;

    fn id(&self) -> i64 {
        self.id
    }

    fn matches(&self, c: &ValveCriteria) -> bool {
        if !c.name.is_empty() && !icontains(&self.name, &c.name) {
            return false;
        }
        if !c.area.is_empty() {
            match &self.area {
                Some(a) if icontains(&a.name, &c.area) => {}
                _ => return false,
            }
        }
        true
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConversionCriteria {
    pub name: String,
    pub from_connection_type: Option<i64>,
    pub to_connection_type: Option<i64>,
    pub area: Option<i64>,
    pub status: Option<ConversionStatus>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
}

impl Criteria for ConversionCriteria {
    fn query_params(&self) -> Vec<(String, String)> {
        let mut q = Vec::new();
        if let Some(v) = self.from_connection_type {
            q.push(("from_connection_type".to_string(), v.to_string()));
        }
        if let Some(v) = self.to_connection_type {
            q.push(("to_connection_type".to_string(), v.to_string()));
        }
        if let Some(v) = self.area {
            q.push(("area".to_string(), v.to_string()));
        }
        if let Some(s) = self.status {
            q.push(("status".to_string(), s.as_str().to_string()));
        }
        if let Some(d) = self.date_from {
            q.push(("date_gte".to_string(), d.format("%Y-%m-%d").to_string()));
        }
        if let Some(d) = self.date_to {
            q.push(("date_lte".to_string(), d.format("%Y-%m-%d").to_string()));
        }
        if !self.name.is_empty() {
            q.push(("name".to_string(), self.name.clone()));
        }
        q
    }
}

impl Listed for Conversion {
    type Criteria = ConversionCriteria;

    fn id(&self) -> i64 {
        self.id
    }

    fn matches(&self, c: &ConversionCriteria) -> bool {
        if c.from_connection_type.is_some_and(|v| v != self.from_connection_type) {
            return false;
        }
        if c.to_connection_type.is_some_and(|v| v != self.to_connection_type) {
            return false;
        }
        if c.area.is_some() && c.area != self.area {
            return false;
        }
        if c.status.is_some_and(|s| s != self.status) {
            return false;
        }
        // Date bounds are inclusive on the calendar day of creation
        let day = self.created_at.date_naive();
        if c.date_from.is_some_and(|d| day < d) {
            return false;
        }
        if c.date_to.is_some_and(|d| day > d) {
            return false;
        }
        if !c.name.is_empty() && !icontains(&self.name, &c.name) {
            return false;
        }
        true
    }

    fn created_at(&self) -> Option<DateTime<Utc>> {
        Some(self.created_at)
    }
}
