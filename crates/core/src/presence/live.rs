// Derived presence views
//
// The hub publishes a `PresenceView` snapshot through a watch channel; each
// `LiveValue` projects it (all collaborators, or those on one field) and only
// reports changes of its own projection.

use super::protocol::{FieldPath, UserLink};
use crate::error::PresenceError;
use futures::stream::{self, Stream};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

/// Who is present and which path each user is focused on
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresenceView {
    focus: BTreeMap<String, Option<String>>,
}

impl PresenceView {
    pub fn from_entries(entries: impl IntoIterator<Item = (String, Option<String>)>) -> Self {
        Self {
            focus: entries.into_iter().collect(),
        }
    }

    /// Every present user, ordered by id
    pub fn collaborators(&self) -> Vec<UserLink> {
        self.focus.keys().map(UserLink::user).collect()
    }

    /// Users whose focused path equals `path`, ordered by id
    pub fn collaborators_for(&self, path: &FieldPath) -> Vec<UserLink> {
        self.focus
            .iter()
            .filter(|(_, focused)| focused.as_deref() == Some(path.as_str()))
            .map(|(user_id, _)| UserLink::user(user_id))
            .collect()
    }

    pub fn focused_path(&self, user_id: &str) -> Option<&str> {
        self.focus.get(user_id).and_then(|path| path.as_deref())
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.focus.contains_key(user_id)
    }

    pub fn len(&self) -> usize {
        self.focus.len()
    }

    pub fn is_empty(&self) -> bool {
        self.focus.is_empty()
    }
}

type Projection<T> = Arc<dyn Fn(&PresenceView) -> T + Send + Sync>;

/// A live, queryable value derived from the hub's presence view
pub struct LiveValue<T> {
    rx: watch::Receiver<Arc<PresenceView>>,
    project: Projection<T>,
    last: T,
}

impl<T> LiveValue<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    pub(crate) fn new(
        mut rx: watch::Receiver<Arc<PresenceView>>,
        project: impl Fn(&PresenceView) -> T + Send + Sync + 'static,
    ) -> Self {
        let project: Projection<T> = Arc::new(project);
        let last = project(&rx.borrow_and_update());
        Self { rx, project, last }
    }

    /// Current value
    pub fn get(&self) -> T {
        (self.project)(&self.rx.borrow())
    }

    /// Wait until the projected value differs from the last one returned.
    ///
    /// Fails with `PresenceError::Destroyed` once the hub is destroyed.
    pub async fn changed(&mut self) -> Result<T, PresenceError> {
        loop {
            self.rx
                .changed()
                .await
                .map_err(|_| PresenceError::Destroyed)?;
            let next = (self.project)(&self.rx.borrow_and_update());
            if next != self.last {
                self.last = next.clone();
                return Ok(next);
            }
        }
    }

    /// Stream of changes, ending when the hub is destroyed
    pub fn into_stream(self) -> impl Stream<Item = T> + Send {
        stream::unfold(self, |mut live| async move {
            match live.changed().await {
                Ok(value) => Some((value, live)),
                Err(_) => None,
            }
        })
    }
}

impl<T: fmt::Debug> fmt::Debug for LiveValue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveValue").field("last", &self.last).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn view(entries: &[(&str, Option<&str>)]) -> Arc<PresenceView> {
        Arc::new(PresenceView::from_entries(
            entries
                .iter()
                .map(|(u, p)| (u.to_string(), p.map(str::to_string))),
        ))
    }

    #[test]
    fn test_view_filters_by_path() {
        let path = FieldPath::new("title", "en-US");
        let view = view(&[
            ("u3", Some("fields.title.en-US")),
            ("u2", Some("fields.title.de-DE")),
            ("u4", None),
        ]);
        assert_eq!(view.collaborators_for(&path), vec![UserLink::user("u3")]);
        assert_eq!(
            view.collaborators(),
            vec![UserLink::user("u2"), UserLink::user("u3"), UserLink::user("u4")]
        );
    }

    #[tokio::test]
    async fn test_changed_skips_irrelevant_updates() {
        let (tx, rx) = watch::channel(view(&[]));
        let path = FieldPath::new("title", "en-US");
        let mut live = LiveValue::new(rx, move |v| v.collaborators_for(&path));

        // Someone joins without focusing the field: no change for this projection.
        tx.send(view(&[("u2", None)])).unwrap();
        tx.send(view(&[("u2", Some("fields.title.en-US"))])).unwrap();

        assert_eq!(live.changed().await.unwrap(), vec![UserLink::user("u2")]);
        assert_eq!(live.get(), vec![UserLink::user("u2")]);
    }

    #[tokio::test]
    async fn test_changed_fails_after_sender_dropped() {
        let (tx, rx) = watch::channel(view(&[("u2", None)]));
        let mut live = LiveValue::new(rx, |v| v.collaborators());
        drop(tx);

        assert!(matches!(live.changed().await, Err(PresenceError::Destroyed)));
        assert_eq!(live.get(), vec![UserLink::user("u2")]);
    }

    #[tokio::test]
    async fn test_stream_ends_with_sender() {
        let (tx, rx) = watch::channel(view(&[]));
        let live = LiveValue::new(rx, |v| v.len());
        let mut changes = Box::pin(live.into_stream());

        tx.send(view(&[("u2", None)])).unwrap();
        assert_eq!(changes.next().await, Some(1));
        drop(tx);
        assert_eq!(changes.next().await, None);
    }
}
