use serde_json::{json, Value};
use tads_models::{AssetClass, DeliberationState, Direction};

/// JSON schema handed to the backend for the final risk judgment.
pub fn decision_schema() -> Value {
    let tier = json!({
        "type": "object",
        "properties": {
            "ko_level": {"type": "number"},
            "distance_pct": {"type": "number"},
            "risk": {"type": "string", "enum": ["low", "medium", "high"]}
        },
        "required": ["ko_level", "distance_pct", "risk"]
    });
    let strategies = json!({
        "type": "object",
        "nullable": true,
        "properties": {
            "conservative": tier,
            "moderate": tier,
            "aggressive": tier
        }
    });
    let zones = json!({
        "type": "array",
        "items": {
            "type": "object",
            "properties": {
                "level": {"type": "number"},
                "description": {"type": "string"}
            },
            "required": ["level", "description"]
        }
    });
    let direction = json!({"type": "string", "enum": ["LONG", "SHORT", "HOLD"]});

    json!({
        "type": "object",
        "properties": {
            "signal": {"type": "string", "enum": ["LONG", "SHORT", "HOLD", "IGNORE"]},
            "confidence": {"type": "number"},
            "unable_to_assess": {"type": "boolean"},
            "unable_to_assess_reason": {"type": "string", "nullable": true},
            "price_usd": {"type": "number"},
            "price_eur": {"type": "number"},
            "strategies": strategies,
            "hold_alternative": {
                "type": "object",
                "nullable": true,
                "properties": {
                    "direction": direction,
                    "rationale": {"type": "string"},
                    "strategies": strategies
                }
            },
            "support_zones": zones,
            "resistance_zones": zones,
            "timeframes": {
                "type": "object",
                "properties": {
                    "short_term": direction,
                    "medium_term": direction,
                    "long_term": direction
                }
            },
            "detailed_analysis": {"type": "string"}
        },
        "required": ["signal", "confidence", "unable_to_assess", "timeframes", "detailed_analysis"]
    })
}

fn schema_text() -> String {
    serde_json::to_string_pretty(&decision_schema()).unwrap_or_default()
}

fn price_line(state: &DeliberationState) -> String {
    match state.current_price {
        Some(price) => format!("${price:.2}"),
        None => "unknown (no price could be obtained)".to_string(),
    }
}

fn context_block(state: &DeliberationState) -> String {
    format!(
        "## Technical Analysis\n{}\n\n\
         ## News & Events\n{}\n\n\
         ## Fundamentals/Context\n{}\n",
        state.context.technical, state.context.news, state.context.fundamentals
    )
}

fn asset_line(state: &DeliberationState) -> String {
    let name = state.context.asset_name.as_deref().unwrap_or(&state.symbol);
    format!("{name} ({})", state.asset_class.as_str())
}

pub fn price_prompt(symbol: &str, as_of: &str) -> String {
    format!(
        "Search for the current price of {symbol} as of {as_of}.\n\
         Return ONLY a JSON object (no markdown):\n\
         {{\"price_usd\": 100.00, \"asset_name\": \"Company Name\", \"source\": \"yahoo.com\"}}"
    )
}

pub fn eur_rate_prompt(as_of: &str) -> String {
    format!(
        "Search for the EUR/USD exchange rate as of {as_of} (US dollars per euro).\n\
         Return ONLY a JSON object (no markdown):\n\
         {{\"rate\": 1.08}}"
    )
}

pub fn technical_prompt(state: &DeliberationState) -> String {
    format!(
        "Search for technical analysis of {symbol} as of {as_of}.\n\n\
         Provide:\n\
         - Current price and recent price action\n\
         - 50-day and 200-day moving averages (if available)\n\
         - RSI and MACD status\n\
         - Key support levels (2-3) and resistance levels (2-3)\n\
         - Overall trend (bullish/bearish/neutral)\n\
         - Volume analysis\n\n\
         {lang}\n\
         Keep response under 2000 words.",
        symbol = state.symbol,
        as_of = state.as_of,
        lang = state.language.instruction("Respond"),
    )
}

pub fn news_prompt(state: &DeliberationState) -> String {
    format!(
        "Search for the latest news about {symbol} from {as_of}.\n\n\
         Focus on:\n\
         - Recent earnings or financial reports\n\
         - Analyst ratings and price targets\n\
         - Major announcements and sector news\n\
         - Geopolitical events, sanctions and elections\n\
         - Tariffs and trade policy\n\
         - Central bank policy (Fed, ECB) and currency moves\n\n\
         {lang}\n\
         Keep response under 1500 words.",
        symbol = state.symbol,
        as_of = state.as_of,
        lang = state.language.instruction("Respond"),
    )
}

/// Company fundamentals for stocks, market context for everything else.
pub fn fundamentals_prompt(state: &DeliberationState) -> String {
    let focus = match state.asset_class {
        AssetClass::Stock => {
            "Search for fundamental data of {symbol} as of {as_of}.\n\n\
             Provide:\n\
             - Market cap and P/E ratio\n\
             - Revenue growth and profit margins\n\
             - Debt levels\n\
             - Competitive position\n\
             - Recent insider activity\n\
             - Supply chain and tariff exposure"
        }
        _ => {
            "Search for market context of {symbol} as of {as_of}.\n\n\
             Provide:\n\
             - Supply and demand factors\n\
             - Seasonal patterns\n\
             - Macro factors and central bank policy\n\
             - Positioning and fund flows\n\
             - Geopolitical risk and safe-haven demand\n\
             - USD strength or weakness impact"
        }
    };
    format!(
        "{}\n\n{}\nKeep response under 1500 words.",
        focus
            .replace("{symbol}", &state.symbol)
            .replace("{as_of}", &state.as_of.to_string()),
        state.language.instruction("Respond"),
    )
}

fn counter_section(opponent: &str, text: Option<&str>) -> String {
    match text {
        Some(text) => format!(
            "\n## {opponent}'s Arguments to Counter\n{text}\n\nDirectly address and counter each point.\n"
        ),
        None => String::new(),
    }
}

pub fn bull_prompt(state: &DeliberationState, bear_argument: Option<&str>) -> String {
    format!(
        "You are a BULLISH analyst advocating a LONG position in {symbol}.\n\n\
         ## Current Data (as of {as_of})\n\
         - **Asset**: {asset}\n\
         - **Price**: {price}\n\n\
         {context}{counter}\n\
         ## Your Task\n\
         Build a strong case for why {symbol} will RISE. Focus on:\n\
         1. Bullish technical signals\n\
         2. Positive catalysts\n\
         3. Strong fundamentals or market tailwinds\n\
         4. Why the bears are wrong\n\n\
         Be specific with price targets. {lang}\n\
         Keep response under 2000 words.",
        symbol = state.symbol,
        as_of = state.as_of,
        asset = asset_line(state),
        price = price_line(state),
        context = context_block(state),
        counter = counter_section("Bear", bear_argument),
        lang = state.language.instruction("Respond"),
    )
}

pub fn bear_prompt(state: &DeliberationState, bull_argument: Option<&str>) -> String {
    format!(
        "You are a BEARISH analyst arguing AGAINST a long position in {symbol}.\n\n\
         ## Current Data (as of {as_of})\n\
         - **Asset**: {asset}\n\
         - **Price**: {price}\n\n\
         {context}{counter}\n\
         ## Your Task\n\
         Build a strong case for why {symbol} will FALL. Focus on:\n\
         1. Bearish technical signals\n\
         2. Negative catalysts or risks\n\
         3. Weak fundamentals or headwinds\n\
         4. Why the bulls are wrong\n\n\
         Be specific with downside targets. {lang}\n\
         Keep response under 2000 words.",
        symbol = state.symbol,
        as_of = state.as_of,
        asset = asset_line(state),
        price = price_line(state),
        context = context_block(state),
        counter = counter_section("Bull", bull_argument),
        lang = state.language.instruction("Respond"),
    )
}

pub fn direction_judge_prompt(state: &DeliberationState) -> String {
    format!(
        "You are the INVESTMENT JUDGE for {symbol}.\n\n\
         ## Current Price: {price}\n\
         ## Date: {as_of}\n\n\
         Use search to verify the latest news and current situation for {symbol}.\n\n\
         {context}\n\
         ## Full Debate History\n{transcript}\n\
         ## Your Task\n\
         1. Consider ALL data, not just the debate\n\
         2. Evaluate which side presented stronger evidence\n\
         3. Identify the 2-3 most important factors\n\
         4. Acknowledge the main risks\n\
         5. Decide: **LONG**, **SHORT**, or **HOLD**\n\n\
         End with exactly one of:\n\
         - RECOMMENDATION: **LONG**\n\
         - RECOMMENDATION: **SHORT**\n\
         - RECOMMENDATION: **HOLD**\n\n\
         {lang}\n\
         Keep response under 1500 words.",
        symbol = state.symbol,
        price = price_line(state),
        as_of = state.as_of,
        context = context_block(state),
        transcript = state.render_transcript(),
        lang = state.language.instruction("Respond"),
    )
}

fn decision_line(direction: Direction) -> String {
    format!("## Investment Decision: **{}**", direction.as_str())
}

pub fn risky_prompt(state: &DeliberationState, direction: Direction) -> String {
    format!(
        "You are the AGGRESSIVE risk analyst for {symbol}.\n\n\
         {decision}\n\
         ## Current Price: {price}\n\n\
         {context}\n\
         ## Debate So Far\n{transcript}\n\
         Advocate HIGH-REWARD strategies:\n\
         - Tight knockout barriers (5-8% from price)\n\
         - Maximize upside potential\n\
         - Why waiting is wrong\n\
         - News catalysts that could accelerate the move\n\n\
         Propose aggressive knockout levels. {lang}\n\
         Keep response under 1200 words.",
        symbol = state.symbol,
        decision = decision_line(direction),
        price = price_line(state),
        context = context_block(state),
        transcript = state.render_transcript(),
        lang = state.language.instruction("Respond"),
    )
}

pub fn safe_prompt(state: &DeliberationState, direction: Direction, risky: &str) -> String {
    format!(
        "You are the CONSERVATIVE risk analyst for {symbol}.\n\n\
         {decision}\n\
         ## Current Price: {price}\n\n\
         {context}\n\
         ## Debate So Far\n{transcript}\n\
         ## Aggressive Analyst's Position\n{risky}\n\n\
         Advocate CAPITAL PRESERVATION:\n\
         - Wide knockout barriers (15-25% from price)\n\
         - Why the aggressive approach is dangerous given current risks\n\
         - Waiting for better entries\n\
         - News risks that could cause sudden moves against the position\n\n\
         Propose conservative knockout levels. {lang}\n\
         Keep response under 1200 words.",
        symbol = state.symbol,
        decision = decision_line(direction),
        price = price_line(state),
        context = context_block(state),
        transcript = state.render_transcript(),
        lang = state.language.instruction("Respond"),
    )
}

pub fn neutral_prompt(state: &DeliberationState, direction: Direction, risky: &str) -> String {
    format!(
        "You are the NEUTRAL risk analyst for {symbol}.\n\n\
         {decision}\n\
         ## Current Price: {price}\n\n\
         {context}\n\
         ## Debate So Far\n{transcript}\n\
         ## Aggressive Analyst's Position\n{risky}\n\n\
         Provide BALANCE:\n\
         - Where is the aggressive view too aggressive given the news environment?\n\
         - Where would a conservative view be too cautious given the fundamentals?\n\
         - What is the practical middle ground?\n\
         - How do macro factors affect the risk/reward?\n\n\
         Propose moderate knockout levels (10-15% from price). {lang}\n\
         Keep response under 1200 words.",
        symbol = state.symbol,
        decision = decision_line(direction),
        price = price_line(state),
        context = context_block(state),
        transcript = state.render_transcript(),
        lang = state.language.instruction("Respond"),
    )
}

fn risk_section(label: &str, text: Option<&str>) -> String {
    format!("### {label}\n{}\n", text.unwrap_or(tads_models::deliberation::NO_DATA))
}

pub fn risk_judge_prompt(state: &DeliberationState, direction: Direction) -> String {
    let price_eur = state
        .price_eur()
        .map(|eur| format!("{eur:.2} EUR"))
        .unwrap_or_else(|| "unknown EUR".to_string());
    format!(
        "You are the FINAL RISK JUDGE for {symbol}.\n\n\
         ## Today's Date: {as_of}\n\
         ## Authoritative Price: {price} USD / {price_eur} (EUR/USD rate {rate:.4})\n\n\
         {context}\n\
         {decision}\n\n\
         ## Investment Debate\n{transcript}\n\
         ## Risk Debate\n{risky}{safe}{neutral}\n\
         ## Output Requirements\n\
         Return ONLY one JSON object conforming to this schema (no markdown):\n\
         {schema}\n\n\
         Rules:\n\
         - For LONG, every knockout level is BELOW the current price; for SHORT, ABOVE.\n\
         - conservative: 15-25% from price (risk low), moderate: 10-15% (medium), aggressive: 5-10% (high).\n\
         - distance_pct is the percentage distance between ko_level and price.\n\
         - When signal is HOLD, leave strategies null and provide hold_alternative with its own \
         direction (LONG or SHORT), a rationale, and tiers for that direction.\n\
         - When signal is LONG, SHORT or IGNORE, hold_alternative is null.\n\
         - Confidence is a number in [0, 1]. Below 0.30 the analysis is unreliable: set \
         unable_to_assess to true, signal to IGNORE and confidence to 0.0, and explain why in \
         unable_to_assess_reason.\n\
         - Timeframes may differ from the main signal; the main signal is the primary recommendation.\n\
         - detailed_analysis covers bull arguments, bear arguments, the decision, the strategy \
         recommendation and current factors.\n\n\
         {lang}",
        symbol = state.symbol,
        as_of = state.as_of,
        price = price_line(state),
        rate = state.eur_usd_rate,
        context = context_block(state),
        decision = decision_line(direction),
        transcript = state.render_transcript(),
        risky = risk_section("Aggressive Analyst", state.risk_arguments.risky.as_deref()),
        safe = risk_section("Conservative Analyst", state.risk_arguments.safe.as_deref()),
        neutral = risk_section("Neutral Analyst", state.risk_arguments.neutral.as_deref()),
        schema = schema_text(),
        lang = state.language.instruction("Write"),
    )
}

/// Retry prompt for the final judgment: schema and subject only.
pub fn minimal_judge_prompt(symbol: &str) -> String {
    format!(
        "Return ONLY one JSON object for {symbol} conforming to this schema, with no other text:\n{}",
        schema_text()
    )
}
