use crate::types::Category;
use serde::Serialize;

/// Number of plotted places per display category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TierCounts([usize; 4]);

impl TierCounts {
    pub fn add(&mut self, category: Category) {
        self.0[category.rank()] += 1;
    }

    pub fn get(&self, category: Category) -> usize {
        self.0[category.rank()]
    }

    /// Size of the list a category stands for. Lists nest, so a category
    /// also counts every category that takes precedence over it.
    pub fn cumulative(&self, category: Category) -> usize {
        self.0[..=category.rank()].iter().sum()
    }

    pub fn total(&self) -> usize {
        self.0.iter().sum()
    }
}

#[derive(Debug, Serialize)]
pub struct LegendEntry {
    pub category: Category,
    pub label: String,
    pub color: String,
    pub count: usize,
    pub cumulative: usize,
}

#[derive(Debug, Serialize)]
pub struct Legend {
    pub entries: Vec<LegendEntry>,
    pub total: usize,
}

impl Legend {
    pub fn new(counts: &TierCounts, styles: &crate::config::CategoriesConfig) -> Self {
        let entries = Category::ALL
            .into_iter()
            .map(|category| {
                let style = styles.style(category);
                LegendEntry {
                    category,
                    label: style.label.clone(),
                    color: style.color.clone(),
                    count: counts.get(category),
                    cumulative: counts.cumulative(category),
                }
            })
            .collect();
        Self { entries, total: counts.total() }
    }
}
