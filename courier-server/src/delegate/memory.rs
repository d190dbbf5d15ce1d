//! In-memory delegate.
//!
//! Mailboxes keyed by author fingerprint. Used by the binary when no other
//! store is wired in, and by the tests.

use super::{DataStream, MailData, ServerDelegate};
use crate::error::DelegateError;
use async_trait::async_trait;
use courier_types::{Address, Envelope};
use dashmap::DashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone)]
struct StoredMail {
    name: String,
    seq: u64,
    message: Envelope,
    data: Option<Arc<[u8]>>,
}

impl StoredMail {
    /// Sealed mail is visible to its recipients and its author; plain mail
    /// to everyone.
    fn visible_to(&self, author: &Address, reader: &Address) -> bool {
        !self.message.is_sealed()
            || self.message.is_addressed_to(reader.fingerprint())
            || author.fingerprint() == reader.fingerprint()
    }
}

/// Delegate backed by in-process maps.
#[derive(Debug, Default)]
pub struct MemoryDelegate {
    mailboxes: DashMap<String, Vec<StoredMail>>,
    descriptions: DashMap<String, Vec<Envelope>>,
    next_seq: AtomicU64,
}

impl MemoryDelegate {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// File `message` under `name` in `author`'s mailbox.
    ///
    /// Returns the sequence number assigned to the item. Storing a name that
    /// already exists replaces the earlier item.
    pub fn store(
        &self,
        author: &Address,
        name: impl Into<String>,
        message: Envelope,
        data: Option<Vec<u8>>,
    ) -> u64 {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed) + 1;
        let name = name.into();
        let mut mailbox = self
            .mailboxes
            .entry(author.fingerprint().to_string())
            .or_default();
        mailbox.retain(|item| item.name != name);
        mailbox.push(StoredMail {
            name,
            seq,
            message,
            data: data.map(Arc::from),
        });
        seq
    }

    /// Descriptions saved for the given recipient fingerprint.
    ///
    /// Envelopes with no recipients are filed under the empty string.
    pub fn descriptions_for(&self, fingerprint: &str) -> Vec<Envelope> {
        self.descriptions
            .get(fingerprint)
            .map(|d| d.clone())
            .unwrap_or_default()
    }

    fn find(&self, name: &str, author: &Address, for_addr: &Address) -> Option<StoredMail> {
        let mailbox = self.mailboxes.get(author.fingerprint())?;
        mailbox
            .iter()
            .find(|item| item.name == name && item.visible_to(author, for_addr))
            .cloned()
    }
}

#[async_trait]
impl ServerDelegate for MemoryDelegate {
    async fn save_message_description(&self, envelope: Envelope) -> Result<(), DelegateError> {
        if envelope.recipients.is_empty() {
            self.descriptions.entry(String::new()).or_default().push(envelope);
            return Ok(());
        }
        for fingerprint in envelope.recipients.keys() {
            self.descriptions
                .entry(fingerprint.clone())
                .or_default()
                .push(envelope.clone());
        }
        Ok(())
    }

    async fn retrieve_data_for_user(
        &self,
        name: &str,
        author: &Address,
        for_addr: &Address,
    ) -> Result<Option<MailData>, DelegateError> {
        Ok(self.find(name, author, for_addr).map(|item| MailData {
            message: item.message,
            data: item
                .data
                .map(|bytes| Box::new(Cursor::new(bytes)) as DataStream),
        }))
    }

    async fn retrieve_message_for_user(
        &self,
        name: &str,
        author: &Address,
        for_addr: &Address,
    ) -> Result<Option<Envelope>, DelegateError> {
        Ok(self.find(name, author, for_addr).map(|item| item.message))
    }

    async fn retrieve_message_list_for_user(
        &self,
        since: u64,
        author: &Address,
        for_addr: &Address,
    ) -> Result<Option<Vec<Envelope>>, DelegateError> {
        let Some(mailbox) = self.mailboxes.get(author.fingerprint()) else {
            return Ok(None);
        };
        let mut items: Vec<&StoredMail> = mailbox
            .iter()
            .filter(|item| item.seq > since && item.visible_to(author, for_addr))
            .collect();
        items.sort_by_key(|item| item.seq);
        Ok(Some(items.into_iter().map(|item| item.message.clone()).collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_types::{Identity, Mail, SignedPayload};
    use tokio::io::AsyncReadExt;

    fn mail_from(author: &Identity, to: &Identity, name: &str) -> SignedPayload {
        author
            .sign_message(
                to.address(),
                &Mail {
                    name: Some(name.into()),
                    components: vec![],
                },
            )
            .unwrap()
    }

    #[tokio::test]
    async fn sealed_mail_is_only_visible_to_recipients_and_author() {
        let store = MemoryDelegate::new();
        let alice = Identity::generate().unwrap();
        let bob = Identity::generate().unwrap();
        let eve = Identity::generate().unwrap();

        let envelope = Envelope::seal(&mail_from(&alice, &bob, "note"), &[bob.address().clone()]).unwrap();
        store.store(alice.address(), "note", envelope, None);

        for reader in [&alice, &bob] {
            assert!(store
                .retrieve_message_for_user("note", alice.address(), reader.address())
                .await
                .unwrap()
                .is_some());
        }
        assert!(store
            .retrieve_message_for_user("note", alice.address(), eve.address())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn unknown_name_is_none() {
        let store = MemoryDelegate::new();
        let alice = Identity::generate().unwrap();
        assert!(store
            .retrieve_message_for_user("missing", alice.address(), alice.address())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn data_stream_yields_stored_bytes() {
        let store = MemoryDelegate::new();
        let alice = Identity::generate().unwrap();
        let envelope = Envelope::plain(&mail_from(&alice, &alice, "big")).unwrap();
        store.store(alice.address(), "big", envelope, Some(b"bulk bytes".to_vec()));

        let mail = store
            .retrieve_data_for_user("big", alice.address(), alice.address())
            .await
            .unwrap()
            .unwrap();
        let mut data = Vec::new();
        mail.data.unwrap().read_to_end(&mut data).await.unwrap();
        assert_eq!(data, b"bulk bytes");
    }

    #[tokio::test]
    async fn list_respects_watermark_and_order() {
        let store = MemoryDelegate::new();
        let alice = Identity::generate().unwrap();
        let reader = Identity::generate().unwrap();

        let first = store.store(
            alice.address(),
            "one",
            Envelope::plain(&mail_from(&alice, &reader, "one")).unwrap(),
            None,
        );
        store.store(
            alice.address(),
            "two",
            Envelope::plain(&mail_from(&alice, &reader, "two")).unwrap(),
            None,
        );
        store.store(
            alice.address(),
            "three",
            Envelope::plain(&mail_from(&alice, &reader, "three")).unwrap(),
            None,
        );

        let all = store
            .retrieve_message_list_for_user(0, alice.address(), reader.address())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(all.len(), 3);

        let newer = store
            .retrieve_message_list_for_user(first, alice.address(), reader.address())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(newer.len(), 2);
        assert_eq!(newer[0], all[1]);
    }

    #[tokio::test]
    async fn list_for_unknown_author_is_none() {
        let store = MemoryDelegate::new();
        let alice = Identity::generate().unwrap();
        assert!(store
            .retrieve_message_list_for_user(0, alice.address(), alice.address())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn descriptions_are_filed_per_recipient() {
        let store = MemoryDelegate::new();
        let alice = Identity::generate().unwrap();
        let bob = Identity::generate().unwrap();
        let carol = Identity::generate().unwrap();

        let envelope = Envelope::seal(
            &mail_from(&alice, &bob, "hi"),
            &[bob.address().clone(), carol.address().clone()],
        )
        .unwrap();
        store.save_message_description(envelope.clone()).await.unwrap();

        assert_eq!(store.descriptions_for(bob.address().fingerprint()), vec![envelope.clone()]);
        assert_eq!(store.descriptions_for(carol.address().fingerprint()), vec![envelope]);
        assert!(store.descriptions_for(alice.address().fingerprint()).is_empty());
    }
}
