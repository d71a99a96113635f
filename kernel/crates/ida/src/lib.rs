#![no_std]
#![allow(clippy::needless_return)]

extern crate alloc;

#[cfg(test)]
extern crate std;

use alloc::vec::Vec;
use core::cmp::min;

const BITS_PER_WORD: usize = u64::BITS as usize;

/// id分配器
///
/// 已分配的id在位图中置1。位图按需增长，因此空的分配器不占用堆内存，
/// 可以用于静态变量的const初始化。
pub struct IdAllocator {
    current_id: usize,
    min_id: usize,
    max_id: usize,
    used: usize,
    bitmap: Vec<u64>,
}

impl IdAllocator {
    /// 创建一个新的id分配器
    pub const fn new(initial_id: usize, max_id: usize) -> Option<Self> {
        if initial_id >= max_id {
            return None;
        }
        Some(Self {
            current_id: initial_id,
            min_id: initial_id,
            max_id,
            used: 0,
            bitmap: Vec::new(),
        })
    }

    /// 可用的id数量
    #[inline]
    pub fn available(&self) -> usize {
        self.max_id - self.min_id - self.used
    }

    /// 分配一个新的id
    ///
    /// ## 返回
    ///
    /// 如果分配成功，返回Some(id)，否则返回None
    pub fn alloc(&mut self) -> Option<usize> {
        if self.available() == 0 {
            return None;
        }

        if let Some(try1) = self.do_find_first_free_index(self.current_id, self.max_id) {
            self.current_id = try1;
            self.set_bit(try1);
            self.used += 1;
            return Some(try1);
        }

        // 从头开始找
        if let Some(try2) =
            self.do_find_first_free_index(self.min_id, min(self.current_id, self.max_id))
        {
            self.current_id = try2;
            self.set_bit(try2);
            self.used += 1;
            return Some(try2);
        }
        return None;
    }

    /// 检查id是否存在
    ///
    /// ## 参数
    ///
    /// - `id`：要检查的id
    ///
    /// ## 返回
    ///
    /// 如果id存在，返回true，否则返回false
    pub fn exists(&self, id: usize) -> bool {
        if id < self.min_id || id >= self.max_id {
            return false;
        }
        let (word, bit) = self.position(id);
        match self.bitmap.get(word) {
            Some(w) => (w >> bit) & 1 == 1,
            None => false,
        }
    }

    fn do_find_first_free_index(&self, start_id: usize, end: usize) -> Option<usize> {
        (start_id..end).find(|&i| !self.exists(i))
    }

    /// 释放一个id
    ///
    /// ## 参数
    ///
    /// - `id`：要释放的id
    pub fn free(&mut self, id: usize) {
        if id < self.min_id || id >= self.max_id {
            return;
        }
        let (word, bit) = self.position(id);
        if let Some(w) = self.bitmap.get_mut(word) {
            if (*w >> bit) & 1 == 1 {
                *w &= !(1u64 << bit);
                self.used -= 1;
            }
        }
    }

    /// 返回已经使用的id数量
    pub fn used(&self) -> usize {
        self.used
    }

    /// 返回最大id数
    pub fn get_max_id(&self) -> usize {
        self.max_id
    }

    fn position(&self, id: usize) -> (usize, usize) {
        let offset = id - self.min_id;
        (offset / BITS_PER_WORD, offset % BITS_PER_WORD)
    }

    fn set_bit(&mut self, id: usize) {
        let (word, bit) = self.position(id);
        if word >= self.bitmap.len() {
            self.bitmap.resize(word + 1, 0);
        }
        self.bitmap[word] |= 1u64 << bit;
    }
}

impl core::fmt::Debug for IdAllocator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("IdAllocator")
            .field("current_id", &self.current_id)
            .field("min_id", &self.min_id)
            .field("max_id", &self.max_id)
            .field("used", &self.used)
            .field("bitmap_words", &self.bitmap.len())
            .finish()
    }
}
