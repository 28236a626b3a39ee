//! FIFO queue of orders sharing one price key.

use super::order::Order;
use std::collections::VecDeque;

/// Orders resting at one price, in arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PriceLevel {
    price: u64,
    orders: VecDeque<Order>,
}

impl PriceLevel {
    pub fn new(price: u64) -> Self {
        Self {
            price,
            orders: VecDeque::new(),
        }
    }

    /// Key of the level in its index.
    #[inline]
    pub fn price(&self) -> u64 {
        self.price
    }

    /// Appends at the back of the queue.
    #[inline]
    pub fn push(&mut self, order: Order) {
        self.orders.push_back(order);
    }

    /// Removes the order with `id`, preserving the order of the rest.
    pub fn remove(&mut self, id: u64) -> Option<Order> {
        let index = self.orders.iter().position(|o| o.id == id)?;
        self.orders.remove(index)
    }

    /// Oldest order, mutable.
    #[inline]
    pub fn front_mut(&mut self) -> Option<&mut Order> {
        self.orders.front_mut()
    }

    #[inline]
    pub fn pop_front(&mut self) -> Option<Order> {
        self.orders.pop_front()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Order> {
        self.orders.iter()
    }

    /// Sum of open amounts at this level.
    pub fn total_volume(&self) -> u64 {
        self.orders
            .iter()
            .fold(0u64, |acc, o| acc.saturating_add(o.remaining()))
    }
}
