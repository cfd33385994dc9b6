//! Deterministic replica placement via rendezvous (highest random weight) hashing.

use sha1::{Digest, Sha1};
use url::Url;

/// A single replica chosen by [`rendezvous`]: either a peer to forward to, or the
/// sentinel meaning "this node is itself a chosen replica".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Local,
    Remote(Url),
}

/// Choose the top `from_` replicas for `key` out of `urls`, ordered by descending
/// rendezvous score. `self_url`, if present among `urls`, is reported as [`Target::Local`]
/// rather than [`Target::Remote`].
///
/// Deterministic: identical `(key, urls, self_url, from_)` always produces the identical
/// ordering, on any node, which is what lets every node in the cluster agree on a key's
/// replica set without coordination.
///
/// An empty `urls` always yields `[Target::Local]`; callers must pass `from_ == 1` in
/// that case.
pub fn rendezvous(key: &[u8], urls: &[Url], self_url: Option<&Url>, from_: usize) -> Vec<Target> {
    if urls.is_empty() {
        return vec![Target::Local];
    }

    let mut scored: Vec<(Vec<u8>, &Url)> = urls
        .iter()
        .map(|url| (score(key, url), url))
        .collect();

    // Descending score; ties broken by ascending URL bytes for a fully determined order.
    scored.sort_by(|(score_a, url_a), (score_b, url_b)| {
        score_b
            .cmp(score_a)
            .then_with(|| url_a.as_str().cmp(url_b.as_str()))
    });

    scored
        .into_iter()
        .take(from_)
        .map(|(_, url)| {
            if Some(url) == self_url {
                Target::Local
            } else {
                Target::Remote(url.clone())
            }
        })
        .collect()
}

fn score(key: &[u8], url: &Url) -> Vec<u8> {
    let mut hasher = Sha1::new();
    hasher.update(key);
    hasher.update(url.as_str().as_bytes());
    hasher.finalize().to_vec()
}

/// Find which entry in `cluster_urls`, if any, names this node: a URL whose port matches
/// the port this node is bound to and whose host is a local address (`localhost` or
/// `127.0.0.1`). Returns `None` both when `cluster_urls` is empty (single-node mode, no
/// self-matching needed) and when it's non-empty but nothing matches, in which case every
/// rendezvous target is treated as remote and a warning is logged so a misconfigured
/// `--cluster-urls` list doesn't fail silently.
pub fn detect_self_url(cluster_urls: &[Url], port: u16) -> Option<Url> {
    if cluster_urls.is_empty() {
        return None;
    }

    let found = cluster_urls.iter().find(|url| is_our_url(url, port)).cloned();
    if found.is_none() {
        tracing::warn!(
            port,
            cluster_urls = ?cluster_urls.iter().map(Url::as_str).collect::<Vec<_>>(),
            "could not match this node's port against any cluster URL; treating every rendezvous target as remote"
        );
    }
    found
}

fn is_our_url(url: &Url, port: u16) -> bool {
    url.port() == Some(port) && matches!(url.host_str(), Some("localhost") | Some("127.0.0.1"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn urls(strs: &[&str]) -> Vec<Url> {
        strs.iter().map(|s| Url::parse(s).unwrap()).collect()
    }

    #[test]
    fn empty_cluster_yields_local() {
        let targets = rendezvous(b"k1", &[], None, 1);
        assert_eq!(targets, vec![Target::Local]);
    }

    #[test]
    fn deterministic_across_calls() {
        let u = urls(&["http://a:8001/", "http://b:8002/", "http://c:8003/"]);
        let first = rendezvous(b"k1", &u, None, 3);
        let second = rendezvous(b"k1", &u, None, 3);
        assert_eq!(first, second);
    }

    #[test]
    fn self_url_reported_as_local() {
        let u = urls(&["http://a:8001/", "http://b:8002/", "http://c:8003/"]);
        let self_url = Url::parse("http://b:8002/").unwrap();
        let targets = rendezvous(b"k1", &u, Some(&self_url), 3);
        assert!(targets.iter().any(|t| *t == Target::Local));
        assert!(!targets
            .iter()
            .any(|t| matches!(t, Target::Remote(url) if url == &self_url)));
    }

    #[test]
    fn from_limits_length() {
        let u = urls(&["http://a:8001/", "http://b:8002/", "http://c:8003/"]);
        assert_eq!(rendezvous(b"k1", &u, None, 2).len(), 2);
        assert_eq!(rendezvous(b"k1", &u, None, 1).len(), 1);
    }

    #[test]
    fn detect_self_url_matches_on_port_and_local_host() {
        let u = urls(&["http://127.0.0.1:8001/", "http://localhost:8002/", "http://other:8003/"]);
        assert_eq!(detect_self_url(&u, 8002), Some(Url::parse("http://localhost:8002/").unwrap()));
    }

    #[test]
    fn detect_self_url_is_none_for_empty_cluster() {
        assert_eq!(detect_self_url(&[], 8001), None);
    }

    #[test]
    fn detect_self_url_is_none_when_no_port_matches() {
        let u = urls(&["http://127.0.0.1:8001/", "http://localhost:8002/"]);
        assert_eq!(detect_self_url(&u, 9999), None);
    }

    #[test]
    fn coverage_is_roughly_uniform() {
        let u = urls(&["http://a:8001/", "http://b:8002/", "http://c:8003/"]);
        let mut first_choice_counts = [0usize; 3];
        let n = 6000;
        for i in 0..n {
            let key = format!("key-{i}");
            let targets = rendezvous(key.as_bytes(), &u, None, 1);
            let winner = match &targets[0] {
                Target::Remote(url) => url.as_str(),
                Target::Local => unreachable!(),
            };
            let idx = u.iter().position(|candidate| candidate.as_str() == winner).unwrap();
            first_choice_counts[idx] += 1;
        }
        let expected = n / 3;
        for count in first_choice_counts {
            let deviation = (count as f64 - expected as f64).abs() / expected as f64;
            assert!(deviation < 0.15, "deviation too large: {count} vs {expected}");
        }
    }
}
