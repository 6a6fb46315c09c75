/// In-process broker
///
/// 命名 FIFO 队列 + 手动 ack 的内存实现，用于单进程部署和测试。
/// 消费者被丢弃时，未确认的消息按原顺序放回队首（至少一次投递）。

use super::{Broker, BrokerError, Consumer, Delivery};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Default)]
struct QueueInner {
    ready: VecDeque<Vec<u8>>,
    unacked: BTreeMap<u64, Vec<u8>>,
    next_tag: u64,
    has_consumer: bool,
    closed: bool,
}

struct MemoryQueue {
    name: String,
    inner: Mutex<QueueInner>,
    notify: Notify,
}

impl MemoryQueue {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            inner: Mutex::new(QueueInner::default()),
            notify: Notify::new(),
        }
    }
}

#[derive(Default)]
pub struct MemoryBroker {
    queues: Mutex<HashMap<String, Arc<MemoryQueue>>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn queue(&self, name: &str) -> Arc<MemoryQueue> {
        self.queues
            .lock()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MemoryQueue::new(name)))
            .clone()
    }

    /// Removes and returns every ready message without delivering it
    pub fn drain(&self, queue: &str) -> Vec<Vec<u8>> {
        self.queue(queue).inner.lock().ready.drain(..).collect()
    }

    /// Number of delivered but not yet acknowledged messages
    pub fn unacked(&self, queue: &str) -> usize {
        self.queue(queue).inner.lock().unacked.len()
    }

    /// Closes every queue; pending `Consumer::next` calls return `None`
    pub fn close(&self) {
        for queue in self.queues.lock().values() {
            queue.inner.lock().closed = true;
            queue.notify.notify_one();
        }
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn declare(&self, queue: &str) -> Result<(), BrokerError> {
        self.queue(queue);
        Ok(())
    }

    async fn publish(&self, queue: &str, payload: Vec<u8>) -> Result<(), BrokerError> {
        let queue = self.queue(queue);
        {
            let mut inner = queue.inner.lock();
            if inner.closed {
                return Err(BrokerError::Closed);
            }
            inner.ready.push_back(payload);
        }
        queue.notify.notify_one();
        Ok(())
    }

    async fn purge(&self, queue: &str) -> Result<usize, BrokerError> {
        let queue = self.queue(queue);
        let mut inner = queue.inner.lock();
        let purged = inner.ready.len();
        inner.ready.clear();
        Ok(purged)
    }

    async fn depth(&self, queue: &str) -> Result<usize, BrokerError> {
        Ok(self.queue(queue).inner.lock().ready.len())
    }

    async fn consume(&self, queue: &str) -> Result<Box<dyn Consumer>, BrokerError> {
        let queue = self.queue(queue);
        {
            let mut inner = queue.inner.lock();
            if inner.closed {
                return Err(BrokerError::Closed);
            }
            if inner.has_consumer {
                return Err(BrokerError::ConsumerExists(queue.name.clone()));
            }
            inner.has_consumer = true;
        }
        Ok(Box::new(MemoryConsumer { queue }))
    }
}

struct MemoryConsumer {
    queue: Arc<MemoryQueue>,
}

#[async_trait]
impl Consumer for MemoryConsumer {
    async fn next(&mut self) -> Option<Delivery> {
        loop {
            {
                let mut inner = self.queue.inner.lock();
                if let Some(payload) = inner.ready.pop_front() {
                    inner.next_tag += 1;
                    let tag = inner.next_tag;
                    inner.unacked.insert(tag, payload.clone());
                    return Some(Delivery { tag, payload });
                }
                if inner.closed {
                    return None;
                }
            }
            // publish 在两次检查之间发生时 notify_one 会留下许可
            self.queue.notify.notified().await;
        }
    }

    async fn ack(&mut self, tag: u64) -> Result<(), BrokerError> {
        self.queue
            .inner
            .lock()
            .unacked
            .remove(&tag)
            .map(|_| ())
            .ok_or_else(|| BrokerError::UnknownDelivery {
                queue: self.queue.name.clone(),
                tag,
            })
    }
}

impl Drop for MemoryConsumer {
    fn drop(&mut self) {
        let mut inner = self.queue.inner.lock();
        inner.has_consumer = false;
        let unacked = std::mem::take(&mut inner.unacked);
        for (_, payload) in unacked.into_iter().rev() {
            inner.ready.push_front(payload);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_fifo_delivery_and_depth() {
        let broker = MemoryBroker::new();
        for i in 0..3u8 {
            broker.publish("q", vec![i]).await.unwrap();
        }
        assert_eq!(broker.depth("q").await.unwrap(), 3);

        let mut consumer = broker.consume("q").await.unwrap();
        let first = consumer.next().await.unwrap();
        assert_eq!(first.payload, vec![0]);
        // 已投递未确认的消息不计入深度
        assert_eq!(broker.depth("q").await.unwrap(), 2);
        assert_eq!(broker.unacked("q"), 1);

        consumer.ack(first.tag).await.unwrap();
        assert_eq!(broker.unacked("q"), 0);
        assert_eq!(consumer.next().await.unwrap().payload, vec![1]);
    }

    #[tokio::test]
    async fn test_purge_only_touches_one_queue() {
        let broker = MemoryBroker::new();
        broker.publish("a", vec![1]).await.unwrap();
        broker.publish("a", vec![2]).await.unwrap();
        broker.publish("b", vec![3]).await.unwrap();

        assert_eq!(broker.purge("a").await.unwrap(), 2);
        assert_eq!(broker.depth("a").await.unwrap(), 0);
        assert_eq!(broker.depth("b").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_single_consumer_per_queue() {
        let broker = MemoryBroker::new();
        let _consumer = broker.consume("q").await.unwrap();
        assert_eq!(
            broker.consume("q").await.err(),
            Some(BrokerError::ConsumerExists("q".to_string()))
        );
    }

    #[tokio::test]
    async fn test_consumer_wakes_on_publish() {
        let broker = Arc::new(MemoryBroker::new());
        let mut consumer = broker.consume("q").await.unwrap();

        let publisher = broker.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            publisher.publish("q", b"late".to_vec()).await.unwrap();
        });

        let delivery = tokio::time::timeout(Duration::from_secs(2), consumer.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(delivery.payload, b"late".to_vec());
    }

    #[tokio::test]
    async fn test_unacked_requeued_when_consumer_dropped() {
        let broker = MemoryBroker::new();
        broker.publish("q", vec![1]).await.unwrap();
        broker.publish("q", vec![2]).await.unwrap();

        let mut consumer = broker.consume("q").await.unwrap();
        consumer.next().await.unwrap();
        drop(consumer);

        assert_eq!(broker.drain("q"), vec![vec![1], vec![2]]);
    }

    #[tokio::test]
    async fn test_close_ends_consumption() {
        let broker = MemoryBroker::new();
        let mut consumer = broker.consume("q").await.unwrap();
        broker.close();
        assert!(consumer.next().await.is_none());
        assert_eq!(broker.publish("q", vec![1]).await, Err(BrokerError::Closed));
    }
}
