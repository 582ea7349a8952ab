use crate::models::{MatchSuggestion, Material, ParsedItem};
use rayon::prelude::*;

/// 物料匹配 (只给建议, 不写 material_id)
///
/// 评分: SKU 完全一致为 1.0; 否则取 包含率 与 Ratcliff–Obershelp 相似度 的较大者。
/// 候选按 (名称, ID) 预排序, 同分时先出现者胜出, 结果与调用次数无关。
pub struct MaterialMatcher {
    candidates: Vec<Candidate>,
    threshold: f64,
}

struct Candidate {
    id: i64,
    name: Vec<char>,
    sku: Option<String>,
}

impl MaterialMatcher {
    pub fn new(catalog: &[Material], threshold: f64) -> Self {
        let mut sorted: Vec<&Material> = catalog.iter().collect();
        sorted.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));

        let candidates = sorted
            .into_iter()
            .map(|m| Candidate {
                id: m.id,
                name: normalize(&m.name).chars().collect(),
                sku: m.sku.as_deref().map(normalize).filter(|s| !s.is_empty()),
            })
            .collect();

        Self {
            candidates,
            threshold: threshold.clamp(0.0, 1.0),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// 单条明细的匹配建议; 低于阈值返回 None
    pub fn suggest(&self, description: Option<&str>, sku: Option<&str>) -> Option<MatchSuggestion> {
        if let Some(sku) = sku.map(normalize).filter(|s| !s.is_empty()) {
            if let Some(c) = self.candidates.iter().find(|c| c.sku.as_deref() == Some(sku.as_str())) {
                return Some(MatchSuggestion {
                    material_id: c.id,
                    confidence: 1.0,
                });
            }
        }

        let description: Vec<char> = normalize(description?).chars().collect();
        if description.is_empty() {
            return None;
        }

        let mut best: Option<(i64, f64)> = None;
        for c in &self.candidates {
            let score = similarity(&description, &c.name);
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((c.id, score));
            }
        }

        best.filter(|(_, score)| *score >= self.threshold && *score > 0.0)
            .map(|(material_id, confidence)| MatchSuggestion {
                material_id,
                confidence: confidence.clamp(0.0, 1.0),
            })
    }

    /// 批量匹配, 顺序与输入一致
    pub fn suggest_all(&self, items: &[ParsedItem]) -> Vec<Option<MatchSuggestion>> {
        if self.is_empty() {
            return vec![None; items.len()];
        }
        items
            .par_iter()
            .map(|item| self.suggest(item.description.as_deref(), item.sku_raw.as_deref()))
            .collect()
    }
}

/// 小写, 非字母数字转空格, 合并空白
pub fn normalize(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .flat_map(char::to_lowercase)
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// 两个已归一化字符串的相似度, 取值 [0, 1]
pub fn similarity(a: &[char], b: &[char]) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }

    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let containment = if long.windows(short.len()).any(|w| w == short) {
        short.len() as f64 / long.len() as f64
    } else {
        0.0
    };

    let ratio = 2.0 * matching_chars(a, b) as f64 / (a.len() + b.len()) as f64;
    containment.max(ratio)
}

fn matching_chars(a: &[char], b: &[char]) -> usize {
    let (i, j, k) = longest_common_block(a, b);
    if k == 0 {
        return 0;
    }
    k + matching_chars(&a[..i], &b[..j]) + matching_chars(&a[i + k..], &b[j + k..])
}

/// 最长公共子串 (a 起点, b 起点, 长度); 同长取最早出现
fn longest_common_block(a: &[char], b: &[char]) -> (usize, usize, usize) {
    let mut best = (0, 0, 0);
    let mut prev = vec![0usize; b.len() + 1];
    let mut cur = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        for (j, cb) in b.iter().enumerate() {
            cur[j + 1] = if ca == cb { prev[j] + 1 } else { 0 };
            let k = cur[j + 1];
            if k > best.2 {
                best = (i + 1 - k, j + 1 - k, k);
            }
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Decimal;
    use chrono::Utc;

    fn material(id: i64, name: &str, sku: Option<&str>) -> Material {
        Material {
            id,
            name: name.to_string(),
            sku: sku.map(str::to_string),
            category: None,
            unit: "buc".to_string(),
            current_stock: Decimal::zero(),
            minimum_stock: Decimal::zero(),
            created_at: Utc::now(),
        }
    }

    fn chars(s: &str) -> Vec<char> {
        normalize(s).chars().collect()
    }

    fn catalog() -> Vec<Material> {
        vec![
            material(1, "Invertor Huawei SUN2000-5KTL", Some("35FV1598")),
            material(2, "Panou fotovoltaic 450W", None),
            material(3, "Cablu solar 6mm", None),
        ]
    }

    #[test]
    fn normalization() {
        assert_eq!(normalize("  Panou-Fotovoltaic,  450W!! "), "panou fotovoltaic 450w");
        assert_eq!(normalize("***"), "");
    }

    #[test]
    fn similarity_bounds() {
        assert_eq!(similarity(&chars("abc"), &chars("abc")), 1.0);
        assert_eq!(similarity(&chars("abc"), &chars("xyz")), 0.0);
        assert_eq!(similarity(&chars(""), &chars("abc")), 0.0);
        // "panou" 完整出现在 "panou a" 中
        let s = similarity(&chars("panou"), &chars("panou a"));
        assert!((s - 10.0 / 12.0).abs() < 1e-9);
    }

    #[test]
    fn matching_is_deterministic() {
        let matcher = MaterialMatcher::new(&catalog(), 0.5);
        let first = matcher.suggest(Some("Panou fotovoltaic mono 450 W"), None);
        let second = matcher.suggest(Some("Panou fotovoltaic mono 450 W"), None);
        assert_eq!(first, second);

        let suggestion = first.unwrap();
        assert_eq!(suggestion.material_id, 2);
        assert!(suggestion.confidence > 0.5 && suggestion.confidence <= 1.0);
    }

    #[test]
    fn ties_prefer_smaller_name() {
        let catalog = vec![material(1, "Panou B", None), material(2, "Panou A", None)];
        let matcher = MaterialMatcher::new(&catalog, 0.5);
        let suggestion = matcher.suggest(Some("panou"), None).unwrap();
        assert_eq!(suggestion.material_id, 2);
    }

    #[test]
    fn below_threshold_gives_no_suggestion() {
        let matcher = MaterialMatcher::new(&catalog(), 0.5);
        assert_eq!(matcher.suggest(Some("Transport marfa"), None), None);
        assert_eq!(matcher.suggest(None, None), None);
        assert_eq!(matcher.suggest(Some("--"), None), None);
    }

    #[test]
    fn sku_match_is_certain() {
        let matcher = MaterialMatcher::new(&catalog(), 0.5);
        let suggestion = matcher.suggest(Some("ceva complet diferit"), Some("35fv1598")).unwrap();
        assert_eq!(suggestion.material_id, 1);
        assert_eq!(suggestion.confidence, 1.0);
    }

    #[test]
    fn batch_keeps_input_order() {
        let matcher = MaterialMatcher::new(&catalog(), 0.5);
        let items = vec![
            ParsedItem {
                description: Some("Cablu solar 6 mm rosu".to_string()),
                ..Default::default()
            },
            ParsedItem::default(),
            ParsedItem {
                description: Some("Panou fotovoltaic 450W".to_string()),
                ..Default::default()
            },
        ];
        let suggestions = matcher.suggest_all(&items);
        assert_eq!(suggestions.len(), 3);
        assert_eq!(suggestions[0].map(|s| s.material_id), Some(3));
        assert_eq!(suggestions[1], None);
        assert_eq!(suggestions[2].map(|s| (s.material_id, s.confidence)), Some((2, 1.0)));

        let empty = MaterialMatcher::new(&[], 0.5);
        assert_eq!(empty.suggest_all(&items), vec![None, None, None]);
    }
}
