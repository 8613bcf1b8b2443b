//! Category arbitration between the vision model and the product title.
//!
//! The title rules run in a fixed order and the whole-word / substring
//! distinction per rule is deliberate: an explicit garment word in the title
//! beats the model, an abstract title falls through to the model.

use crate::models::classification::{Category, Gender, Season, Style};
use crate::services::vision::Prediction;

/// Accessory words, English and French. Matched as whole words so that
/// "Baggy" never reads as "bag" and "Spring" never reads as "ring".
const ACCESSORY_WORDS: &[&str] = &[
    "bag",
    "backpack",
    "socks",
    "sock",
    "belt",
    "hat",
    "cap",
    "beanie",
    "balaclava",
    "scarf",
    "gloves",
    "wallet",
    "necklace",
    "bracelet",
    "ring",
    "pendant",
    "jewelry",
    "keychain",
    "towel",
    "flask",
    "ashtray",
    "casquette",
    "chapeau",
    "bonnet",
    "cagoule",
    "echarpe",
    "foulard",
    "gants",
    "ceinture",
    "sac",
    "sacoche",
    "collier",
    "bague",
    "bijoux",
    "chaussettes",
    "portefeuille",
];

/// Footwear words, English and French. Whole-word matched like accessories.
const FOOTWEAR_WORDS: &[&str] = &[
    "boots",
    "sneakers",
    "shoes",
    "sandals",
    "loafers",
    "chaussures",
    "baskets",
    "bottes",
    "mocassins",
];

const SWEATER_TOKENS: &[&str] = &["crewneck", "sweater", "knitwear", "mohair"];
const JACKET_TOKENS: &[&str] = &["jacket", "puffer", "windbreaker", "bomber", "polar", "fleece"];
const PANTS_TOKENS: &[&str] = &["pants", "pant", "jogger", "joggers", "cargo", "trouser"];

/// Every explicit garment token the zip rule treats as evidence of a real
/// garment word: the tokens the rules above recognize plus the French garment
/// vocabulary no rule maps. A bare "zip" with none of these is a zip-up
/// hoodie; "zip" next to any of them is just a closure detail.
const EXPLICIT_TOKENS: &[&str] = &[
    // accessories
    "bag", "backpack", "socks", "sock", "belt", "hat", "cap", "beanie", "balaclava", "scarf",
    "gloves", "wallet", "necklace", "bracelet", "ring", "pendant", "jewelry", "keychain", "towel",
    "flask", "ashtray", "casquette", "chapeau", "bonnet", "cagoule", "echarpe", "foulard", "gants",
    "ceinture", "sac", "sacoche", "collier", "bague", "bijoux", "chaussettes", "portefeuille",
    // footwear
    "boots", "sneakers", "shoes", "sandals", "loafers", "chaussures", "baskets", "bottes",
    "mocassins",
    // garments
    "short", "shorts", "jort", "jorts", "t-shirt", "tshirt", "tee", "longsleeve", "hoodie",
    "crewneck", "sweater", "knitwear", "mohair", "polo", "shirt", "knit", "jacket", "puffer",
    "windbreaker", "bomber", "polar", "fleece", "coat", "pants", "pant", "jogger", "joggers",
    "cargo", "trouser", "baggy", "jeans", "denim", "dress", "skirt",
    // French garments; "pull" stays out, a bare "zip pull" is the zip-up
    // hoodie itself
    "veste", "manteau", "blouson", "doudoune", "pantalon", "jogging", "robe", "jupe", "chemise",
    "sweat",
];

fn title_words(lower: &str) -> Vec<&str> {
    lower
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|w| !w.is_empty())
        .collect()
}

/// Decide the final category from the vision verdict and the product title.
/// Rule order is load-bearing; see the tests for the contract.
pub fn decide_category(vision_category: Category, title: &str) -> Category {
    let lower = title.to_lowercase();
    let words = title_words(&lower);

    let has_word = |w: &str| words.iter().any(|t| *t == w);
    let contains = |needle: &str| lower.contains(needle);

    // 1-2. Accessories and footwear always override the model.
    if ACCESSORY_WORDS.iter().any(|&w| has_word(w)) {
        return Category::Accessories;
    }
    if FOOTWEAR_WORDS.iter().any(|&w| has_word(w)) {
        return Category::Shoes;
    }

    // 3. Shorts, unless "short" is a sleeve-length qualifier.
    if (contains("short") || contains("jort")) && !contains("sleeve") {
        return Category::Shorts;
    }

    // 4-8. Explicit tops.
    if contains("t-shirt") || contains("tshirt") || contains("longsleeve") || has_word("tee") {
        return Category::TShirt;
    }
    if contains("hoodie") {
        return Category::Hoodie;
    }
    if SWEATER_TOKENS.iter().any(|&t| contains(t)) {
        return Category::Sweater;
    }
    if contains("polo") {
        return Category::Polo;
    }
    if has_word("shirt") {
        return Category::Shirt;
    }

    // 9. Knitwear, checked before jackets so "Coat-of-Arms Knit" stays a
    // sweater; "coat" below is whole-word for the same reason.
    if contains("knit") {
        return Category::Sweater;
    }

    // 10. Jackets.
    if JACKET_TOKENS.iter().any(|&t| contains(t)) || has_word("coat") {
        return Category::Jacket;
    }

    // 11. Long pants.
    if PANTS_TOKENS.iter().any(|&t| contains(t)) {
        return Category::LongPants;
    }

    // 12. Jeans, unless the denim is a jacket. A bare "baggy" with no jeans
    // or denim wording is a fit descriptor for pants.
    if (contains("jeans") || contains("denim")) && !contains("jacket") {
        return Category::Jeans;
    }
    if contains("baggy") {
        return Category::LongPants;
    }

    // 13. "zip jacket" is a jacket; a bare "zip" with no other garment word
    // is a zip-up hoodie.
    if contains("zip") {
        if contains("jacket") {
            return Category::Jacket;
        }
        if !EXPLICIT_TOKENS.iter().any(|&t| t != "zip" && contains(t)) {
            return Category::Hoodie;
        }
    }

    // 14. Dresses and skirts.
    if contains("dress") {
        return Category::Dresses;
    }
    if contains("skirt") {
        return Category::Skirt;
    }

    // 15. Abstract title: trust the model.
    vision_category
}

/// Ordered mapping from model-emitted labels to canonical categories.
/// Multi-word entries come first so the substring fallback never shadows
/// "denim jacket" with "jacket" or "t-shirt" with "shirt".
const VISION_LABEL_MAP: &[(&str, Category)] = &[
    ("denim jacket", Category::DenimJacket),
    ("sports jacket", Category::SportsJacket),
    ("long pants", Category::LongPants),
    ("a dress", Category::Dresses),
    ("t-shirt", Category::TShirt),
    ("sneakers", Category::Shoes),
    ("boots", Category::Shoes),
    ("sandals", Category::Shoes),
    ("loafers", Category::Shoes),
    ("shoes", Category::Shoes),
    ("dresses", Category::Dresses),
    ("hoodie", Category::Hoodie),
    ("sweater", Category::Sweater),
    ("blazer", Category::Blazer),
    ("polo", Category::Polo),
    ("jeans", Category::Jeans),
    ("shorts", Category::Shorts),
    ("skirt", Category::Skirt),
    ("jacket", Category::Jacket),
    ("coat", Category::Jacket),
    ("shirt", Category::Shirt),
];

/// Map the top vision prediction onto a canonical category. Unknown labels
/// fall back to t-shirt, the dominant class in this catalog.
pub fn map_vision_label(predictions: &[Prediction]) -> (Category, f64) {
    let Some(top) = predictions.first() else {
        return (Category::TShirt, 0.0);
    };

    let label = top.name.to_lowercase();

    for (known, category) in VISION_LABEL_MAP {
        if label == *known {
            return (*category, top.score);
        }
    }

    for (known, category) in VISION_LABEL_MAP {
        if label.contains(known) || known.contains(label.as_str()) {
            return (*category, top.score);
        }
    }

    tracing::warn!(label = %label, "unknown label from model, defaulting to t-shirt");
    (Category::TShirt, top.score)
}

pub fn map_gender(predictions: &[Prediction]) -> (Gender, f64) {
    let Some(top) = predictions.first() else {
        return (Gender::Unisex, 0.0);
    };
    let label = top.name.to_lowercase();

    // "women" first: it contains "men".
    let gender = if label.contains("women") {
        Gender::Female
    } else if label.contains("men") {
        Gender::Male
    } else if label.contains("kid") || label.contains("child") {
        Gender::Kids
    } else {
        Gender::Unisex
    };
    (gender, top.score)
}

pub fn map_style(predictions: &[Prediction]) -> (Style, f64) {
    let Some(top) = predictions.first() else {
        return (Style::Casual, 0.0);
    };
    let label = top.name.to_lowercase();

    let style = if label.contains("formal") {
        Style::Formal
    } else if label.contains("sport") || label.contains("athletic") {
        Style::Sport
    } else if label.contains("street") {
        Style::Streetwear
    } else if label.contains("vintage") {
        Style::Vintage
    } else if label.contains("minimal") {
        Style::Minimalist
    } else {
        Style::Casual
    };
    (style, top.score)
}

pub fn map_season(predictions: &[Prediction]) -> (Season, f64) {
    let Some(top) = predictions.first() else {
        return (Season::AllSeason, 0.0);
    };
    let label = top.name.to_lowercase();

    let season = if label.contains("summer") {
        Season::Summer
    } else if label.contains("winter") {
        Season::Winter
    } else if label.contains("spring") || label.contains("fall") || label.contains("mid") {
        Season::MidSeason
    } else {
        Season::AllSeason
    };
    (season, top.score)
}

/// Top three colors above the noise floor.
pub fn map_colors(predictions: &[Prediction]) -> (String, String, String) {
    let mut picked = predictions
        .iter()
        .filter(|p| p.score > 0.1)
        .take(3)
        .map(|p| p.name.clone());

    (
        picked.next().unwrap_or_default(),
        picked.next().unwrap_or_default(),
        picked.next().unwrap_or_default(),
    )
}

/// Display-name projection stored on the product row.
pub fn product_type_for(category: Category) -> &'static str {
    match category {
        Category::Blazer => "Blazer",
        Category::DenimJacket => "Denim Jacket",
        Category::Dresses => "Dresses",
        Category::Hoodie => "Hoodie",
        Category::Jacket => "Jacket",
        Category::Jeans => "Jeans",
        Category::LongPants => "Long Pants",
        Category::Polo => "Polo",
        Category::Shirt => "Shirt",
        Category::Shorts => "Shorts",
        Category::Skirt => "Skirt",
        Category::SportsJacket => "Sports Jacket",
        Category::Sweater => "Sweater",
        Category::TShirt => "T-shirt",
        Category::Shoes => "Shoes",
        Category::Accessories => "Accessories",
        Category::Other => "Other",
    }
}
