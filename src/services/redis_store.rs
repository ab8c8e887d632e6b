use crate::{
    error::StoreError,
    models::{NewTransaction, PaymentTransaction, TransactionState, Transition},
    services::store::{TransactionStore, CURRENCY},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;

/// KEYS[1] = transaction hash; ARGV = acquirer_reference, updated_at, reconcilable states...
const MARK_DONE_SCRIPT: &str = r#"
local state = redis.call('HGET', KEYS[1], 'state')
if not state then
  return {'missing', ''}
end
if state == 'done' then
  return {'done', redis.call('HGET', KEYS[1], 'acquirer_reference') or ''}
end
for i = 3, #ARGV do
  if ARGV[i] == state then
    redis.call('HSET', KEYS[1], 'state', 'done', 'acquirer_reference', ARGV[1], 'updated_at', ARGV[2])
    return {'applied', ''}
  end
end
return {'refused', state}
"#;

/// KEYS[1] = reference index, KEYS[2] = id sequence; ARGV = prefix, field/value pairs...
const INSERT_NEW_SCRIPT: &str = r#"
if redis.call('SCARD', KEYS[1]) > 0 then
  return 0
end
local id = redis.call('INCR', KEYS[2])
redis.call('HSET', ARGV[1] .. ':tx:' .. id, unpack(ARGV, 2))
redis.call('SADD', KEYS[1], id)
return id
"#;

/// Transactions stored as Redis hashes (`<prefix>:tx:<id>`) with a set index
/// per reference (`<prefix>:ref:<reference>`).
pub struct RedisTransactionStore {
    conn: redis::aio::ConnectionManager,
    prefix: String,
    mark_done_script: redis::Script,
    insert_new_script: redis::Script,
}

impl RedisTransactionStore {
    pub async fn connect(redis_url: &str, prefix: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_connection_manager().await?;
        tracing::info!("Redis transaction store connected");

        Ok(Self {
            conn,
            prefix: prefix.to_string(),
            mark_done_script: redis::Script::new(MARK_DONE_SCRIPT),
            insert_new_script: redis::Script::new(INSERT_NEW_SCRIPT),
        })
    }

    fn tx_key(&self, id: u64) -> String {
        format!("{}:tx:{}", self.prefix, id)
    }

    fn ref_key(&self, reference: &str) -> String {
        format!("{}:ref:{}", self.prefix, reference)
    }

    fn seq_key(&self) -> String {
        format!("{}:tx:seq", self.prefix)
    }

    fn decode(&self, id: u64, mut fields: HashMap<String, String>) -> Result<PaymentTransaction, StoreError> {
        let key = self.tx_key(id);
        let corrupt = |reason: String| StoreError::Corrupt {
            key: key.clone(),
            reason,
        };
        let mut take = |name: &str| {
            fields
                .remove(name)
                .ok_or_else(|| corrupt(format!("missing field {}", name)))
        };
        let timestamp = |raw: String| {
            DateTime::parse_from_rfc3339(&raw)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| corrupt(e.to_string()))
        };

        let reference = take("reference")?;
        let amount = Decimal::from_str(&take("amount")?).map_err(|e| corrupt(e.to_string()))?;
        let currency = take("currency")?;
        let state = TransactionState::from_str(&take("state")?).map_err(&corrupt)?;
        let created_at = timestamp(take("created_at")?)?;
        let updated_at = timestamp(take("updated_at")?)?;
        let acquirer_reference = fields.remove("acquirer_reference").filter(|r| !r.is_empty());

        Ok(PaymentTransaction {
            id,
            reference,
            amount,
            currency,
            state,
            acquirer_reference,
            created_at,
            updated_at,
        })
    }
}

#[async_trait]
impl TransactionStore for RedisTransactionStore {
    async fn insert(&self, tx: NewTransaction) -> Result<PaymentTransaction, StoreError> {
        let mut conn = self.conn.clone();
        let id: u64 = conn.incr(self.seq_key(), 1).await?;
        let record = new_record(id, tx);

        redis::pipe()
            .atomic()
            .hset_multiple(self.tx_key(id), &record_fields(&record))
            .ignore()
            .sadd(self.ref_key(&record.reference), id)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await?;

        tracing::debug!(id, reference = %record.reference, "Transaction stored in Redis");
        Ok(record)
    }

    async fn insert_new(&self, tx: NewTransaction) -> Result<Option<PaymentTransaction>, StoreError> {
        let mut conn = self.conn.clone();
        // Id is assigned by the script.
        let mut record = new_record(0, tx);

        let mut invocation = self.insert_new_script.key(self.ref_key(&record.reference));
        invocation.key(self.seq_key()).arg(&self.prefix);
        for (name, value) in record_fields(&record) {
            invocation.arg(name).arg(value);
        }

        let id: u64 = invocation.invoke_async(&mut conn).await?;
        if id == 0 {
            tracing::debug!(reference = %record.reference, "Reference already stored in Redis");
            return Ok(None);
        }

        record.id = id;
        tracing::debug!(id, reference = %record.reference, "Transaction stored in Redis");
        Ok(Some(record))
    }

    async fn search(&self, reference: &str) -> Result<Vec<PaymentTransaction>, StoreError> {
        let mut conn = self.conn.clone();
        let mut ids: Vec<u64> = conn.smembers(self.ref_key(reference)).await?;
        ids.sort_unstable();

        let mut found = Vec::with_capacity(ids.len());
        for id in ids {
            let fields: HashMap<String, String> = conn.hgetall(self.tx_key(id)).await?;
            if fields.is_empty() {
                tracing::warn!(id, reference, "Dangling reference index entry");
                continue;
            }
            found.push(self.decode(id, fields)?);
        }
        Ok(found)
    }

    async fn mark_done(&self, id: u64, acquirer_reference: &str) -> Result<Transition, StoreError> {
        let mut conn = self.conn.clone();
        let mut invocation = self.mark_done_script.key(self.tx_key(id));
        invocation.arg(acquirer_reference).arg(Utc::now().to_rfc3339());
        for state in TransactionState::RECONCILABLE {
            invocation.arg(state.as_str());
        }

        let reply: Vec<String> = invocation.invoke_async(&mut conn).await?;
        match reply.as_slice() {
            [status, _] if status == "applied" => Ok(Transition::Applied),
            [status, existing] if status == "done" => Ok(Transition::AlreadyDone {
                acquirer_reference: Some(existing.clone()).filter(|r| !r.is_empty()),
            }),
            [status, state] if status == "refused" => {
                let state = TransactionState::from_str(state).map_err(|reason| StoreError::Corrupt {
                    key: self.tx_key(id),
                    reason,
                })?;
                Ok(Transition::Refused(state))
            }
            [status, _] if status == "missing" => Err(StoreError::NotFound(id)),
            other => Err(StoreError::Corrupt {
                key: self.tx_key(id),
                reason: format!("unexpected script reply {:?}", other),
            }),
        }
    }

    async fn ping(&self) -> bool {
        let mut conn = self.conn.clone();
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .is_ok()
    }
}

fn new_record(id: u64, tx: NewTransaction) -> PaymentTransaction {
    let now = Utc::now();
    PaymentTransaction {
        id,
        reference: tx.reference,
        amount: tx.amount,
        currency: CURRENCY.to_string(),
        state: tx.state,
        acquirer_reference: None,
        created_at: now,
        updated_at: now,
    }
}

fn record_fields(record: &PaymentTransaction) -> [(&'static str, String); 7] {
    [
        ("reference", record.reference.clone()),
        ("amount", record.amount.to_string()),
        ("currency", record.currency.clone()),
        ("state", record.state.as_str().to_string()),
        ("acquirer_reference", String::new()),
        ("created_at", record.created_at.to_rfc3339()),
        ("updated_at", record.updated_at.to_rfc3339()),
    ]
}
