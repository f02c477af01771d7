use state_machines::state_machine;

state_machine! {
    name: IngestionMachine,
    state: IngestionState,
    initial: Ready,
    states: [Ready, ContentHashed, Sectioned, Extracted, Embedded, Persisted, Failed],
    events {
        hash_content { transition: { from: Ready, to: ContentHashed } }
        section { transition: { from: ContentHashed, to: Sectioned } }
        extract { transition: { from: Sectioned, to: Extracted } }
        embed { transition: { from: Extracted, to: Embedded } }
        persist { transition: { from: Embedded, to: Persisted } }
        abort {
            transition: { from: Ready, to: Failed }
            transition: { from: ContentHashed, to: Failed }
            transition: { from: Sectioned, to: Failed }
            transition: { from: Extracted, to: Failed }
            transition: { from: Embedded, to: Failed }
            transition: { from: Persisted, to: Failed }
        }
    }
}

pub fn ready() -> IngestionMachine<(), Ready> {
    IngestionMachine::new(())
}
