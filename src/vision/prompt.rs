//! 判定用の固定プロンプト

pub const EVALUATION_PROMPT: &str = "You are an expert archaeologist analyzing satellite imagery for potential geoglyphs or archaeological features in the Amazon rainforest.

Analyze this satellite image and determine if it shows:
1. Potential geoglyphs (earthworks, geometric patterns)
2. Archaeological features (cleared areas, linear features, circular structures)
3. Natural formations that might be mistaken for archaeological features

Provide your analysis in JSON format with:
- isValid (boolean): true if this appears to be a valid archaeological feature
- confidence (number 0-100): your confidence level
- analysis (string): detailed explanation of what you observe
- features (array of strings): list of notable features observed

Be thorough but cautious. Consider vegetation patterns, geometric shapes, and human-made versus natural features.";
