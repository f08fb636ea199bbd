//! Human-readable phrasing for facts.
//!
//! Answers and acknowledgments are composed from fixed per-key templates,
//! with generic phrasings for the `favorite_<thing>` and `<thing>_name`
//! families and a last-resort phrasing for anything else.

use synapse_core::Fact;

/// Sentence describing a stored fact, used when answering a question.
pub fn fact_sentence(key: &str, value: &str) -> String {
    match key {
        "name" => format!("Your name is {}.", value),
        "age" => format!("You are {} years old.", value),
        "location" => format!("You live in {}.", value),
        "origin" => format!("You are from {}.", value),
        "pet" => format!("You have a {}.", value),
        "pet_name" => format!("Your pet is called {}.", value),
        "birthday" => format!("Your birthday is {}.", value),
        "occupation" => format!("Your job: {}.", value),
        "likes" => format!("You like {}.", value),
        "description" => format!("You told me you are {}.", value),
        "favorite_color" => format!("Your favorite color is {}.", value),
        "favorite_food" => format!("Your favorite food is {}. Sounds delicious!", value),
        "favorite_movie" => format!("Your favorite movie is {}.", value),
        "favorite_song" => format!("Your favorite song is {}.", value),
        "favorite_book" => format!("Your favorite book is {}.", value),
        "favorite_game" => format!("Your favorite game is {}.", value),
        "favorite_sport" => format!("Your favorite sport is {}.", value),
        "favorite_animal" => format!("Your favorite animal is {}.", value),
        _ => {
            if let Some(thing) = key.strip_prefix("favorite_") {
                format!(
                    "You mentioned that your favorite {} is {}.",
                    humanize(thing),
                    value
                )
            } else if let Some(thing) = key.strip_suffix("_name") {
                format!("Your {}'s name is {}.", humanize(thing), value)
            } else {
                format!("I remember your {} is {}.", humanize(key), value)
            }
        }
    }
}

/// Acknowledgment for facts the user just shared, if any.
///
/// A pet and its name are acknowledged together; otherwise the first fact
/// decides the phrasing.
pub fn acknowledge(facts: &[Fact]) -> Option<String> {
    let value_of = |key: &str| facts.iter().find(|f| f.key == key).map(|f| f.value.as_str());

    if let (Some(pet), Some(name)) = (value_of("pet"), value_of("pet_name")) {
        return Some(format!(
            "Aww! {} the {} sounds adorable! I'll remember that!",
            name, pet
        ));
    }

    let fact = facts.first()?;
    let v = fact.value.as_str();
    let ack = match fact.key.as_str() {
        "name" => format!("Nice to meet you, {}! I'll remember that.", v),
        "favorite_color" => format!("Got it! {} is a great color! I'll remember that.", v),
        "favorite_food" => format!("Yum! {} sounds delicious! I'll remember that.", v),
        "favorite_movie" => format!("Nice choice! I'll remember that {} is your favorite movie!", v),
        "favorite_song" => format!("Great taste in music! I'll remember {}!", v),
        "favorite_book" => format!("A book lover! I'll remember {}!", v),
        "favorite_game" => format!("Cool! I'll remember that {} is your favorite game!", v),
        "favorite_sport" | "favorite_animal" => format!("Nice! I'll remember that you love {}!", v),
        "age" => format!("Got it! You're {} years old. I'll remember that!", v),
        "location" => format!("Cool! {} sounds nice! I'll remember you live there.", v),
        "origin" => format!("Nice! {} is a great place! I'll remember that.", v),
        "likes" => format!("Nice! I'll remember that you like {}!", v),
        "pet_name" => format!("Cute name! I'll remember that your pet is called {}!", v),
        "pet" => format!("A {}! I'll remember that.", v),
        "birthday" => format!("I'll remember your birthday is {}!", v),
        "occupation" => format!("Interesting! I'll remember your job: {}.", v),
        "description" => format!("Thanks for telling me you're {}. I'll remember that.", v),
        key => {
            if let Some(thing) = key.strip_prefix("favorite_") {
                format!("Got it! I'll remember that your favorite {} is {}.", humanize(thing), v)
            } else if let Some(thing) = key.strip_suffix("_name") {
                format!("I'll remember that your {} is called {}.", humanize(thing), v)
            } else {
                format!("Got it! I'll remember that your {} is {}.", humanize(key), v)
            }
        }
    };
    Some(ack)
}

/// `User:` / `Bot:` transcript lines, skipping empty sides.
pub fn transcript<'a, I>(turns: I) -> String
where
    I: IntoIterator<Item = &'a synapse_core::Turn>,
{
    let mut lines = Vec::new();
    for turn in turns {
        if !turn.user_text.is_empty() {
            lines.push(format!("User: {}", turn.user_text));
        }
        if !turn.bot_text.is_empty() {
            lines.push(format!("Bot: {}", turn.bot_text));
        }
    }
    lines.join("\n")
}

fn humanize(key: &str) -> String {
    key.replace('_', " ")
}
