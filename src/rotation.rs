use crate::types::Category;

/// Cyclic category ordering plus the category currently playing.
#[derive(Debug, Clone)]
pub struct CategoryRotation {
  order: Vec<Category>,
  current: Category,
}

impl Default for CategoryRotation {
  fn default() -> Self {
    CategoryRotation::new(Category::ALL.to_vec(), Category::Betting)
  }
}

impl CategoryRotation {
  /// An empty `order` falls back to every category in declaration order.
  pub fn new(order: Vec<Category>, current: Category) -> Self {
    let order = if order.is_empty() {
      Category::ALL.to_vec()
    } else {
      order
    };
    CategoryRotation { order, current }
  }

  pub fn current(&self) -> Category {
    self.current
  }

  pub fn advance_to(&mut self, category: Category) {
    self.current = category;
  }

  /// Cyclic successor. Categories missing from the ordering lead back to its start.
  pub fn next(&self, category: Category) -> Category {
    match self.order.iter().position(|c| *c == category) {
      Some(i) => self.order[(i + 1) % self.order.len()],
      None => self.order[0],
    }
  }

  pub fn next_after_current(&self) -> Category {
    self.next(self.current)
  }
}
