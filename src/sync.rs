use crate::ledger::ConnectionIdentity;
use crate::location::{Navigation, NavigationStamp, UrlSync};
use crate::model::{
    LinkSignal, MemberSnapshot, SyncMessage, WatchEvent, WatchItem, compact_error,
    parse_watch_frame,
};
use crate::reconciler::{ApplyOutcome, Reconciler};
use crate::reconnect::{ConnectionState, ReconnectManager, ReconnectPolicy};
use crate::selection::Selection;
use crate::transport::{ListSource, WatchTransport};
use chrono::{DateTime, Local};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const DEFAULT_MEMBER_PARAM: &str = "namespace";
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, PartialEq)]
pub struct SyncOptions {
    pub reconnect: ReconnectPolicy,
    /// Pause between a completed bulk fetch and opening the watch.
    pub settle_delay: Duration,
    pub member_param: String,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            reconnect: ReconnectPolicy::default(),
            settle_delay: DEFAULT_SETTLE_DELAY,
            member_param: DEFAULT_MEMBER_PARAM.to_string(),
        }
    }
}

/// Live mirror of one target's collection plus the selection over it.
///
/// One instance is one scope: `activate` starts a target, `teardown` (or
/// drop) ends it. Background work reports through the channel given to
/// [`Synchronizer::new`] and only takes effect once the owner feeds each
/// message back through [`Synchronizer::handle`].
pub struct Synchronizer<T> {
    target: Option<String>,
    epoch: u64,
    scope: u64,
    options: SyncOptions,
    lister: Arc<dyn ListSource<T>>,
    tx: mpsc::UnboundedSender<SyncMessage<T>>,
    fetch: Option<JoinHandle<()>>,
    reconciler: Reconciler<T>,
    selection: Selection,
    seeded: bool,
    url_sync: UrlSync,
    link: ReconnectManager<T>,
    loading: bool,
    last_error: Option<String>,
    last_synced: Option<DateTime<Local>>,
}

impl<T> Synchronizer<T>
where
    T: WatchItem + DeserializeOwned,
{
    pub fn new(
        lister: Arc<dyn ListSource<T>>,
        transport: Arc<dyn WatchTransport>,
        tx: mpsc::UnboundedSender<SyncMessage<T>>,
        options: SyncOptions,
    ) -> Self {
        let link = ReconnectManager::new(transport, tx.clone(), options.reconnect);
        let url_sync = UrlSync::new(options.member_param.clone());
        Self {
            target: None,
            epoch: 0,
            scope: 0,
            options,
            lister,
            tx,
            fetch: None,
            reconciler: Reconciler::default(),
            selection: Selection::default(),
            seeded: false,
            url_sync,
            link,
            loading: false,
            last_error: None,
            last_synced: None,
        }
    }

    /// Starts (or restarts) the flow for `target`: bulk list, then watch.
    pub fn activate(&mut self, target: &str) {
        let switching = self.target.as_deref() != Some(target);
        self.teardown();

        if switching {
            info!("switching watch target to '{target}'");
            self.scope += 1;
            self.reconciler.clear();
            self.selection.clear();
            self.seeded = false;
            self.url_sync.reset();
            self.last_synced = None;
            self.last_error = None;
        }

        self.target = Some(target.to_string());
        self.start_fetch(target);
    }

    /// Re-lists the active target. The running watch stays up until the new
    /// snapshot lands and is then reopened behind it, so a failed re-list
    /// leaves live updates flowing.
    pub fn refresh(&mut self) -> bool {
        let Some(target) = self.target.clone() else {
            return false;
        };
        if let Some(task) = self.fetch.take() {
            task.abort();
        }
        self.start_fetch(&target);
        true
    }

    fn start_fetch(&mut self, target: &str) {
        self.epoch += 1;
        self.loading = true;

        let lister = Arc::clone(&self.lister);
        let tx = self.tx.clone();
        let epoch = self.epoch;
        let target = target.to_string();
        self.fetch = Some(tokio::spawn(async move {
            let result = lister
                .list(&target)
                .await
                .map_err(|error| compact_error(&error));
            let _ = tx.send(SyncMessage::Listed {
                epoch,
                target,
                result,
            });
        }));
    }

    /// Cancels the in-flight fetch, closes the watch and clears any pending
    /// reconnect. Collection data is kept for display.
    pub fn teardown(&mut self) {
        if let Some(task) = self.fetch.take() {
            task.abort();
        }
        self.link.shutdown();
        self.epoch += 1;
        self.target = None;
        self.loading = false;
    }

    /// Applies one message from the background tasks. Returns whether the
    /// visible state changed.
    pub fn handle(&mut self, message: SyncMessage<T>, navigation: &Navigation) -> bool {
        match message {
            SyncMessage::Listed {
                epoch,
                target,
                result,
            } => self.on_listed(epoch, &target, result, navigation),
            SyncMessage::Link { identity, signal } => self.on_link(&identity, signal),
            SyncMessage::ReconnectDue { identity } => {
                let Some(target) = self.link.take_due(&identity) else {
                    return false;
                };
                if self.target.as_deref() != Some(target.as_str()) {
                    return false;
                }
                self.link.connect(&target, Duration::ZERO)
            }
        }
    }

    fn on_listed(
        &mut self,
        epoch: u64,
        target: &str,
        result: Result<Vec<T>, String>,
        navigation: &Navigation,
    ) -> bool {
        if epoch != self.epoch || self.target.as_deref() != Some(target) {
            debug!("discarding stale list result for '{target}' (epoch {epoch})");
            return false;
        }
        self.fetch = None;
        self.loading = false;

        let items = match result {
            Ok(items) => items,
            Err(error) => {
                warn!("listing '{target}' failed: {error}");
                self.last_error = Some(error);
                return true;
            }
        };

        self.reconciler.seed(items);
        self.last_error = None;
        self.last_synced = Some(Local::now());
        let names = self.reconciler.available_names();
        if self.seeded {
            self.selection.retain_available(&names);
        } else {
            let stamp = self.stamp(navigation);
            let url_member = self.url_sync.observe(stamp, navigation);
            self.selection.initialize(&names, url_member);
            self.seeded = true;
        }
        info!("listed {} members for '{target}'", names.len());

        self.link.reconnect(target, self.options.settle_delay);
        true
    }

    fn on_link(&mut self, identity: &ConnectionIdentity, signal: LinkSignal) -> bool {
        match signal {
            LinkSignal::Opened => self.link.on_open(identity),
            LinkSignal::Message(text) => {
                if !self.link.accepts(identity) {
                    debug!("fenced message from {identity}");
                    return false;
                }
                let mut changed = false;
                for line in text.lines().map(str::trim).filter(|line| !line.is_empty()) {
                    match parse_watch_frame::<T>(line) {
                        Ok(Some(event)) => changed |= self.apply_event(event),
                        Ok(None) => {}
                        Err(error) => {
                            warn!("dropping unparseable watch event from {identity}: {error:#}");
                        }
                    }
                }
                changed
            }
            LinkSignal::Error(error) => {
                self.link.on_error(identity, &error);
                true
            }
            LinkSignal::Closed(code) => {
                let active = self.target.as_deref() == Some(identity.target());
                self.link.on_close(identity, code, active);
                true
            }
        }
    }

    fn apply_event(&mut self, event: WatchEvent<T>) -> bool {
        match self.reconciler.apply(event) {
            ApplyOutcome::Added(name) => {
                self.selection.on_member_added(&name);
                true
            }
            ApplyOutcome::Modified(_) => true,
            ApplyOutcome::Deleted(name) => {
                self.selection.on_member_removed(&name);
                true
            }
            ApplyOutcome::Unchanged => false,
            ApplyOutcome::Diagnostic(message) => {
                warn!("watch stream reported: {message}");
                false
            }
        }
    }

    /// Lets a new navigation pick the selection. Each navigation is looked at
    /// once per target, so redraws never re-assert the location's member.
    pub fn observe_navigation(&mut self, navigation: &Navigation) -> bool {
        if self.reconciler.is_empty() {
            return false;
        }
        let stamp = self.stamp(navigation);
        let Some(member) = self.url_sync.observe(stamp, navigation) else {
            return false;
        };
        if !self.reconciler.contains(member) {
            debug!("location names unknown member '{member}'");
            return false;
        }
        info!("location selects '{member}'");
        self.selection.select_only(member);
        true
    }

    /// Explicit selection from the user. Drops the member parameter from the
    /// location so it cannot override this choice later.
    pub fn set_selected_members(&mut self, names: &[String], navigation: &mut Navigation) {
        let available = self.reconciler.available_names();
        self.selection.set_selection(names, &available);
        if self.url_sync.clear_override(navigation) {
            debug!("cleared '{}' from location", self.url_sync.param());
        }
        let stamp = self.stamp(navigation);
        self.url_sync.mark_processed(stamp);
    }

    pub fn set_options(&mut self, options: SyncOptions) {
        if options.member_param != self.options.member_param {
            self.url_sync.set_param(options.member_param.clone());
        }
        self.link.set_policy(options.reconnect);
        self.options = options;
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    pub fn available_members(&self) -> Vec<String> {
        self.reconciler.available_names()
    }

    pub fn selected_members(&self) -> &[String] {
        self.selection.selected()
    }

    pub fn all_selected(&self) -> bool {
        self.selection.all_selected()
    }

    pub fn loading(&self) -> bool {
        self.loading
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.link.state()
    }

    pub fn snapshot(&self) -> MemberSnapshot {
        MemberSnapshot {
            target: self.target().map(str::to_string),
            available: self.available_members(),
            selected: self.selected_members().to_vec(),
            all_selected: self.all_selected(),
            loading: self.loading(),
            last_error: self.last_error.clone(),
            connection: self.connection_state().label().to_string(),
            last_synced: self.last_synced,
        }
    }

    fn stamp(&self, navigation: &Navigation) -> NavigationStamp {
        NavigationStamp {
            epoch: self.scope,
            version: navigation.version(),
        }
    }
}

impl<T> Drop for Synchronizer<T> {
    fn drop(&mut self) {
        if let Some(task) = self.fetch.take() {
            task.abort();
        }
    }
}
