//! Content-mutation events and the URL sets they invalidate.
//!
//! The host's content pipeline reports mutations through these events; each
//! maps to a fixed set of affected URLs (or a full clear for structural
//! changes) consumed by the [`crate::invalidate::Invalidator`].

use url::Url;

/// Site-level URLs every content change touches.
#[derive(Debug, Clone)]
pub struct SiteUrls {
    pub site_root: Url,
    pub aggregate_feed: Url,
}

/// A content mutation reported by the host pipeline.
#[derive(Debug, Clone)]
pub enum MutationEvent {
    /// A content item was created, updated, or removed.
    ContentChanged { permalink: Url, comment_feed: Url },
    /// A reaction (comment) changed moderation state. Only an approval or an
    /// approved item's removal affects rendered output.
    ReactionModerated {
        approved: bool,
        permalink: Url,
        comment_feed: Url,
    },
    /// Site-wide structural change (e.g. presentation-layer switch);
    /// escalates to a full cache clear.
    SiteStructureChanged,
}

/// What the invalidator should do for an event.
#[derive(Debug, Clone, PartialEq)]
pub enum InvalidationPlan {
    Urls(Vec<Url>),
    ClearAll,
    Nothing,
}

impl MutationEvent {
    pub fn plan(&self, site: &SiteUrls) -> InvalidationPlan {
        match self {
            MutationEvent::ContentChanged {
                permalink,
                comment_feed,
            } => InvalidationPlan::Urls(content_urls(permalink, comment_feed, site)),
            MutationEvent::ReactionModerated {
                approved,
                permalink,
                comment_feed,
            } => {
                if *approved {
                    InvalidationPlan::Urls(content_urls(permalink, comment_feed, site))
                } else {
                    InvalidationPlan::Nothing
                }
            }
            MutationEvent::SiteStructureChanged => InvalidationPlan::ClearAll,
        }
    }
}

fn content_urls(permalink: &Url, comment_feed: &Url, site: &SiteUrls) -> Vec<Url> {
    vec![
        comment_feed.clone(),
        permalink.clone(),
        site.aggregate_feed.clone(),
        site.site_root.clone(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site() -> SiteUrls {
        SiteUrls {
            site_root: Url::parse("http://example.com/").unwrap(),
            aggregate_feed: Url::parse("http://example.com/atom/1").unwrap(),
        }
    }

    fn permalink() -> Url {
        Url::parse("http://example.com/post/1").unwrap()
    }

    fn comment_feed() -> Url {
        Url::parse("http://example.com/post/1/atom").unwrap()
    }

    #[test]
    fn content_change_touches_permalink_feeds_and_root() {
        let event = MutationEvent::ContentChanged {
            permalink: permalink(),
            comment_feed: comment_feed(),
        };
        match event.plan(&site()) {
            InvalidationPlan::Urls(urls) => {
                assert_eq!(urls.len(), 4);
                assert!(urls.contains(&permalink()));
                assert!(urls.contains(&comment_feed()));
                assert!(urls.contains(&site().aggregate_feed));
                assert!(urls.contains(&site().site_root));
            }
            other => panic!("expected url plan, got {other:?}"),
        }
    }

    #[test]
    fn unapproved_reaction_invalidates_nothing() {
        let event = MutationEvent::ReactionModerated {
            approved: false,
            permalink: permalink(),
            comment_feed: comment_feed(),
        };
        assert_eq!(event.plan(&site()), InvalidationPlan::Nothing);
    }

    #[test]
    fn approved_reaction_uses_the_content_url_set() {
        let event = MutationEvent::ReactionModerated {
            approved: true,
            permalink: permalink(),
            comment_feed: comment_feed(),
        };
        assert!(matches!(event.plan(&site()), InvalidationPlan::Urls(_)));
    }

    #[test]
    fn structural_change_escalates_to_clear() {
        assert_eq!(
            MutationEvent::SiteStructureChanged.plan(&site()),
            InvalidationPlan::ClearAll
        );
    }
}
