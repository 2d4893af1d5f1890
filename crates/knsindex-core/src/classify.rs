//! Operation classifier — turns block operations into registry events.
//!
//! Rules, per operation:
//! - **Inscribe**: `SetInfo` whose `name` is the token name, whose description
//!   is a valid name for the configured [`NameScheme`], and whose block account
//!   was created by a `CreateIdentifier` in the immediately preceding block.
//! - **SetMetadata / SetPrimary**: `Send` to the sentinel address carrying a
//!   `set_cid` / `set_primary_name` directive in `extra` (username scheme only).
//! - **Transfer**: any other `Send` of exactly the single-unit amount.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::IndexerError;
use crate::registry::{NameKind, RegistryEvent};
use crate::types::{creates_identifier, Block, Operation};

/// Token name every inscription must carry.
pub const TOKEN_NAME: &str = "KNS";

/// Amount of a name-ownership transfer.
pub const TRANSFER_AMOUNT: &str = "0x1";

/// The network has no burn address, so the testnet faucet stands in for one.
pub const SENTINEL_ADDRESS: &str =
    "keeta_aabszsbrqppriqddrkptq5awubshpq3cgsoi4rc624xm6phdt74vo5w7wipwtmiw";

/// Registrable domain accepted by the domain scheme.
pub const DEFAULT_DOMAIN_ROOT: &str = "kns.keeta";

const USERNAME_PATTERN: &str = r"^[a-z0-9_]{1,32}$";
const SET_CID_PATTERN: &str = r"^set_cid (keeta_\w+) (\w+)$";
const SET_PRIMARY_NAME_PATTERN: &str = r"^set_primary_name (keeta_\w+)$";

// ─── Configuration ────────────────────────────────────────────────────────────

/// How descriptions are validated and keyed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NameScheme {
    /// Lowercased `[a-z0-9_]{1,32}` usernames, with CID and primary-name
    /// directives.
    Username,
    /// Case-preserved domain names under a fixed registrable domain.
    Domain { root: String },
}

impl NameScheme {
    pub fn kind(&self) -> NameKind {
        match self {
            Self::Username => NameKind::Username,
            Self::Domain { .. } => NameKind::Domain,
        }
    }

    /// Whether `Send`-to-sentinel directives are interpreted.
    pub fn supports_metadata(&self) -> bool {
        matches!(self, Self::Username)
    }
}

/// Constants the classifier matches against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    pub token_name: String,
    pub scheme: NameScheme,
    pub transfer_amount: String,
    pub sentinel_address: String,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            token_name: TOKEN_NAME.into(),
            scheme: NameScheme::Username,
            transfer_amount: TRANSFER_AMOUNT.into(),
            sentinel_address: SENTINEL_ADDRESS.into(),
        }
    }
}

// ─── Classifier ───────────────────────────────────────────────────────────────

/// Classifies operations of one block at a time.
pub struct Classifier {
    config: ClassifierConfig,
    username: Regex,
    set_cid: Regex,
    set_primary_name: Regex,
}

impl Classifier {
    pub fn new(config: ClassifierConfig) -> Result<Self, IndexerError> {
        let compile =
            |pattern: &str| Regex::new(pattern).map_err(|e| IndexerError::Config(e.to_string()));
        Ok(Self {
            username: compile(USERNAME_PATTERN)?,
            set_cid: compile(SET_CID_PATTERN)?,
            set_primary_name: compile(SET_PRIMARY_NAME_PATTERN)?,
            config,
        })
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Classify every operation in `block`.
    ///
    /// `previous` is the operation list of the immediately preceding processed
    /// block; it is the only history consulted.
    pub fn classify(&self, block: &Block, previous: &[Operation]) -> Vec<RegistryEvent> {
        block
            .operations
            .iter()
            .filter_map(|op| self.classify_operation(block, op, previous))
            .collect()
    }

    fn classify_operation(
        &self,
        block: &Block,
        op: &Operation,
        previous: &[Operation],
    ) -> Option<RegistryEvent> {
        match op {
            Operation::SetInfo { name, description } if *name == self.config.token_name => {
                let name = self.registrable_name(description)?;
                if !creates_identifier(previous, &block.account) {
                    return None;
                }
                Some(RegistryEvent::Inscribe {
                    kind: self.config.scheme.kind(),
                    name,
                    address: block.account.clone(),
                    owner: block.signer.clone(),
                    timestamp: block.timestamp,
                })
            }
            Operation::Send {
                to,
                amount,
                token,
                extra,
            } => {
                if self.is_directive_target(to) {
                    if let Some(extra) = extra {
                        return self.directive(&block.account, extra);
                    }
                }
                (*amount == self.config.transfer_amount).then(|| RegistryEvent::Transfer {
                    kind: self.config.scheme.kind(),
                    token: token.clone(),
                    from: block.account.clone(),
                    to: to.clone(),
                })
            }
            _ => None,
        }
    }

    fn is_directive_target(&self, to: &str) -> bool {
        self.config.scheme.supports_metadata() && to == self.config.sentinel_address
    }

    /// Parse a `set_cid` or `set_primary_name` directive.
    fn directive(&self, account: &str, extra: &str) -> Option<RegistryEvent> {
        if let Some(caps) = self.set_primary_name.captures(extra) {
            return Some(RegistryEvent::SetPrimary {
                address: caps[1].to_string(),
                owner: account.to_string(),
            });
        }
        let caps = self.set_cid.captures(extra)?;
        Some(RegistryEvent::SetMetadata {
            address: caps[1].to_string(),
            owner: account.to_string(),
            value: caps[2].to_string(),
        })
    }

    /// The registry key for `description`, or `None` if it is not a valid name.
    pub fn registrable_name(&self, description: &str) -> Option<String> {
        match &self.config.scheme {
            NameScheme::Username => {
                let name = description.to_lowercase();
                self.username.is_match(&name).then_some(name)
            }
            NameScheme::Domain { root } => {
                let registrable = registrable_domain(description)?;
                registrable
                    .eq_ignore_ascii_case(root)
                    .then(|| description.to_string())
            }
        }
    }
}

/// The last two labels of `host`, lowercased.
fn registrable_domain(host: &str) -> Option<String> {
    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() < 2 || labels.iter().any(|l| l.is_empty()) {
        return None;
    }
    Some(labels[labels.len() - 2..].join(".").to_ascii_lowercase())
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn username_classifier() -> Classifier {
        Classifier::new(ClassifierConfig::default()).unwrap()
    }

    fn domain_classifier() -> Classifier {
        Classifier::new(ClassifierConfig {
            scheme: NameScheme::Domain {
                root: DEFAULT_DOMAIN_ROOT.into(),
            },
            ..Default::default()
        })
        .unwrap()
    }

    fn block(account: &str, signer: &str, operations: Vec<Operation>) -> Block {
        Block {
            hash: "H".into(),
            timestamp: Utc.timestamp_opt(1_764_000_000, 0).unwrap(),
            account: account.into(),
            signer: signer.into(),
            operations,
        }
    }

    fn set_info(name: &str, description: &str) -> Operation {
        Operation::SetInfo {
            name: name.into(),
            description: description.into(),
        }
    }

    fn create(identifier: &str) -> Operation {
        Operation::CreateIdentifier {
            identifier: identifier.into(),
        }
    }

    fn send(to: &str, amount: &str, token: &str, extra: Option<&str>) -> Operation {
        Operation::Send {
            to: to.into(),
            amount: amount.into(),
            token: token.into(),
            extra: extra.map(String::from),
        }
    }

    #[test]
    fn inscribe_after_create_identifier() {
        let c = username_classifier();
        let prev = vec![create("acct1")];
        let b = block("acct1", "acctX", vec![set_info("KNS", "Alice")]);

        let events = c.classify(&b, &prev);
        assert_eq!(events.len(), 1);
        match &events[0] {
            RegistryEvent::Inscribe {
                name,
                address,
                owner,
                timestamp,
                ..
            } => {
                assert_eq!(name, "alice");
                assert_eq!(address, "acct1");
                assert_eq!(owner, "acctX");
                assert_eq!(*timestamp, b.timestamp);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn inscribe_requires_fresh_account() {
        let c = username_classifier();
        let b = block("acct1", "acctX", vec![set_info("KNS", "alice")]);

        assert!(c.classify(&b, &[]).is_empty());
        assert!(c.classify(&b, &[create("acct2")]).is_empty());
        // Any one matching identifier is enough.
        assert_eq!(c.classify(&b, &[create("acct2"), create("acct1")]).len(), 1);
    }

    #[test]
    fn inscribe_rejects_wrong_token_or_name() {
        let c = username_classifier();
        let prev = vec![create("acct1")];

        let wrong_token = block("acct1", "acctX", vec![set_info("ABC", "alice")]);
        assert!(c.classify(&wrong_token, &prev).is_empty());

        let too_long = "a".repeat(33);
        for bad in ["", "has space", "dash-name", too_long.as_str()] {
            let b = block("acct1", "acctX", vec![set_info("KNS", bad)]);
            assert!(c.classify(&b, &prev).is_empty(), "{bad:?} should be rejected");
        }

        let longest = block("acct1", "acctX", vec![set_info("KNS", &"a".repeat(32))]);
        assert_eq!(c.classify(&longest, &prev).len(), 1);
    }

    #[test]
    fn domain_scheme_preserves_case() {
        let c = domain_classifier();
        let prev = vec![create("acct1")];

        let b = block("acct1", "acctX", vec![set_info("KNS", "Alice.KNS.keeta")]);
        match &c.classify(&b, &prev)[..] {
            [RegistryEvent::Inscribe { name, kind, .. }] => {
                assert_eq!(name, "Alice.KNS.keeta");
                assert_eq!(*kind, NameKind::Domain);
            }
            other => panic!("unexpected events {other:?}"),
        }

        for bad in ["alice", "alice.other.keeta", "alice..kns.keeta", "alice.kns.keeta."] {
            let b = block("acct1", "acctX", vec![set_info("KNS", bad)]);
            assert!(c.classify(&b, &prev).is_empty(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn single_unit_send_is_transfer() {
        let c = username_classifier();
        let b = block("acctX", "acctX", vec![send("acctY", "0x1", "acct1", None)]);

        assert_eq!(
            c.classify(&b, &[]),
            vec![RegistryEvent::Transfer {
                kind: NameKind::Username,
                token: "acct1".into(),
                from: "acctX".into(),
                to: "acctY".into(),
            }]
        );

        let payment = block("acctX", "acctX", vec![send("acctY", "0x2", "acct1", None)]);
        assert!(c.classify(&payment, &[]).is_empty());
    }

    #[test]
    fn set_cid_directive() {
        let c = username_classifier();
        let b = block(
            "acctX",
            "acctX",
            vec![send(SENTINEL_ADDRESS, "0x1", "keeta_base", Some("set_cid keeta_acct1 bafy123"))],
        );
        assert_eq!(
            c.classify(&b, &[]),
            vec![RegistryEvent::SetMetadata {
                address: "keeta_acct1".into(),
                owner: "acctX".into(),
                value: "bafy123".into(),
            }]
        );
    }

    #[test]
    fn set_primary_name_directive() {
        let c = username_classifier();
        let b = block(
            "acctX",
            "acctX",
            vec![send(SENTINEL_ADDRESS, "0x1", "keeta_base", Some("set_primary_name keeta_acct1"))],
        );
        assert_eq!(
            c.classify(&b, &[]),
            vec![RegistryEvent::SetPrimary {
                address: "keeta_acct1".into(),
                owner: "acctX".into(),
            }]
        );
    }

    #[test]
    fn unknown_directive_is_ignored_not_transferred() {
        let c = username_classifier();
        let b = block(
            "acctX",
            "acctX",
            vec![send(SENTINEL_ADDRESS, "0x1", "keeta_base", Some("set_avatar keeta_acct1 x"))],
        );
        assert!(c.classify(&b, &[]).is_empty());
    }

    #[test]
    fn domain_scheme_treats_sentinel_send_as_transfer() {
        let c = domain_classifier();
        let b = block(
            "acctX",
            "acctX",
            vec![send(SENTINEL_ADDRESS, "0x1", "acct1", Some("set_cid keeta_acct1 bafy"))],
        );
        assert!(matches!(&c.classify(&b, &[])[..], [RegistryEvent::Transfer { .. }]));
    }

    #[test]
    fn operations_classified_independently() {
        let c = username_classifier();
        let prev = vec![create("acct1")];
        let b = block(
            "acct1",
            "acctX",
            vec![
                set_info("KNS", "alice"),
                Operation::Other { code: 9 },
                send("acctY", "0x1", "acct7", None),
            ],
        );
        let events = c.classify(&b, &prev);
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], RegistryEvent::Inscribe { .. }));
        assert!(matches!(events[1], RegistryEvent::Transfer { .. }));
    }
}
